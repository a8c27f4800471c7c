//! Streaming exchange with the remote synthesis service.
//!
//! One request per text segment; the response body arrives incrementally
//! and every audio record is decoded and forwarded to the scheduler as soon
//! as its line is complete, so playback starts before synthesis finishes.

use crate::config::TtsConfig;
use crate::epoch::EpochCounter;
use crate::error::{Result, SpeakError};
use crate::frame::{AudioFrame, decode_pcm16};
use crate::records::{RecordParser, SynthRecord};
use crate::sched::AudioScheduler;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::StreamExt;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of streaming one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOutcome {
    /// The service reported completion; `frames` audio frames were scheduled.
    Done {
        /// Number of frames forwarded to the scheduler.
        frames: usize,
    },
    /// The caller's epoch was superseded mid-stream; nothing further was
    /// scheduled and the result must be swallowed silently.
    Superseded,
}

/// Client for the streaming synthesis endpoint.
pub struct SynthClient {
    http: reqwest::Client,
    api_url: String,
    default_voice: String,
    timeout: Duration,
    sample_rate: u32,
}

impl SynthClient {
    /// Create a client from the TTS configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SpeakError::Config`] if no API URL is configured.
    pub fn new(config: &TtsConfig, sample_rate: u32) -> Result<Self> {
        let api_url = config
            .api_url
            .clone()
            .ok_or_else(|| SpeakError::Config("tts.api_url is not configured".into()))?;
        Ok(Self {
            http: reqwest::Client::new(),
            api_url,
            default_voice: config.voice.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            sample_rate,
        })
    }

    /// Send one segment and forward its audio frames to `scheduler` as the
    /// response arrives.
    ///
    /// Each frame is epoch-checked immediately before scheduling; a stale
    /// epoch (or a stopped scheduler) turns the rest of the exchange into a
    /// silent no-op. The whole exchange is bounded by the configured
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SpeakError::Transport`] on network failure, non-success
    /// status, a service error record, or timeout.
    pub async fn stream_segment(
        &self,
        text: &str,
        voice: Option<&str>,
        epochs: &EpochCounter,
        epoch: u64,
        scheduler: &AudioScheduler,
    ) -> Result<SegmentOutcome> {
        let voice = voice.unwrap_or(&self.default_voice);
        debug!(bytes = text.len(), voice, "sending synthesis request");

        tokio::time::timeout(
            self.timeout,
            self.exchange(text, voice, epochs, epoch, scheduler),
        )
        .await
        .map_err(|_| {
            SpeakError::transport(format!(
                "synthesis exchange exceeded {}s",
                self.timeout.as_secs()
            ))
        })?
    }

    async fn exchange(
        &self,
        text: &str,
        voice: &str,
        epochs: &EpochCounter,
        epoch: u64,
        scheduler: &AudioScheduler,
    ) -> Result<SegmentOutcome> {
        let response = self
            .http
            .post(&self.api_url)
            .json(&serde_json::json!({ "text": text, "voice": voice }))
            .send()
            .await
            .map_err(|e| SpeakError::transport(format!("synthesis request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeakError::Transport {
                status: Some(status.as_u16()),
                message: extract_error_message(&body),
            });
        }

        let mut parser = RecordParser::new();
        let mut byte_stream = response.bytes_stream();
        let mut frames = 0usize;

        while let Some(chunk) = byte_stream.next().await {
            let chunk =
                chunk.map_err(|e| SpeakError::transport(format!("stream read error: {e}")))?;
            for record in parser.push(&chunk) {
                match self.handle_record(record, epochs, epoch, scheduler, &mut frames) {
                    RecordAction::Continue => {}
                    RecordAction::Finish(outcome) => return outcome,
                }
            }
        }

        // Stream ended without a terminal record; flush a trailing line.
        if let Some(record) = parser.flush()
            && let RecordAction::Finish(outcome) =
                self.handle_record(record, epochs, epoch, scheduler, &mut frames)
        {
            return outcome;
        }

        warn!("synthesis stream ended without terminal record");
        Ok(SegmentOutcome::Done { frames })
    }

    fn handle_record(
        &self,
        record: SynthRecord,
        epochs: &EpochCounter,
        epoch: u64,
        scheduler: &AudioScheduler,
        frames: &mut usize,
    ) -> RecordAction {
        match record {
            SynthRecord::Audio { data } => {
                if !epochs.is_current(epoch) || scheduler.is_stopped() {
                    debug!("discarding late audio record for stale epoch");
                    return RecordAction::Finish(Ok(SegmentOutcome::Superseded));
                }
                match decode_audio_record(&data, self.sample_rate) {
                    Ok(frame) => {
                        scheduler.enqueue(frame);
                        *frames += 1;
                    }
                    Err(e) => {
                        // Dropping one frame is less harmful than aborting
                        // the utterance.
                        warn!("dropping undecodable audio record: {e}");
                    }
                }
                RecordAction::Continue
            }
            SynthRecord::Done => RecordAction::Finish(Ok(SegmentOutcome::Done { frames: *frames })),
            SynthRecord::Error { message } => {
                RecordAction::Finish(Err(SpeakError::transport(message)))
            }
        }
    }
}

enum RecordAction {
    Continue,
    Finish(Result<SegmentOutcome>),
}

/// Decode one base64-wrapped s16le PCM payload into a frame.
fn decode_audio_record(data: &str, sample_rate: u32) -> Result<AudioFrame> {
    let bytes = BASE64
        .decode(data)
        .map_err(|e| SpeakError::Decode(format!("invalid base64 audio payload: {e}")))?;
    let samples = decode_pcm16(&bytes)?;
    Ok(AudioFrame::new(samples, sample_rate))
}

/// Extract a message from a JSON error body, falling back to the raw body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error_msg"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}
