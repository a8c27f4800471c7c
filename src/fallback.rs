//! Fallback bridge over a local, always-available synthesis engine.
//!
//! Used when the remote engine is not configured, returns zero frames, or
//! fails. The bridge honors epoch supersession exactly like the streaming
//! path: a cancelled utterance resolves as a silent no-op, never an error.

use crate::epoch::EpochCounter;
use crate::error::Result;
use crate::frame::AudioFrame;
use crate::sched::AudioScheduler;
use async_trait::async_trait;
use tracing::{debug, info};

/// A local synthesis engine: one utterance in, one buffer of samples out.
/// No streaming.
#[async_trait]
pub trait LocalSynth: Send + Sync {
    /// Synthesize `text` to mono f32 audio at [`LocalSynth::sample_rate`].
    async fn synthesize(&self, text: &str) -> Result<Vec<f32>>;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;
}

/// Scaffold engine: silence proportional to text length. Stands in where no
/// real local engine is wired up and keeps the fallback path exercisable in
/// tests and offline runs.
#[derive(Debug, Clone)]
pub struct SilenceSynth {
    sample_rate: u32,
}

impl SilenceSynth {
    /// Create a silence engine at the given output rate.
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

#[async_trait]
impl LocalSynth for SilenceSynth {
    async fn synthesize(&self, text: &str) -> Result<Vec<f32>> {
        // 100 ms of silence per character.
        let duration_samples =
            (text.chars().count() as f32 * 0.1 * self.sample_rate as f32) as usize;
        Ok(vec![0.0f32; duration_samples])
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Result of a fallback attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackOutcome {
    /// The utterance was synthesized and scheduled.
    Spoke {
        /// Number of frames scheduled (0 for empty text).
        frames: usize,
    },
    /// The caller's epoch was superseded; nothing was scheduled.
    Superseded,
}

/// Wraps a [`LocalSynth`] with the epoch-check discipline.
pub struct FallbackBridge {
    synth: Box<dyn LocalSynth>,
}

impl FallbackBridge {
    /// Wrap a local engine.
    pub fn new(synth: Box<dyn LocalSynth>) -> Self {
        Self { synth }
    }

    /// Synthesize a whole item and schedule it as one frame.
    ///
    /// The epoch is re-checked between synthesis and scheduling: if the
    /// playback was superseded mid-utterance the bridge resolves as a
    /// no-op rather than raising an error.
    ///
    /// # Errors
    ///
    /// Returns the underlying engine's error if synthesis itself fails.
    pub async fn speak(
        &self,
        text: &str,
        epochs: &EpochCounter,
        epoch: u64,
        scheduler: &AudioScheduler,
    ) -> Result<FallbackOutcome> {
        info!(chars = text.chars().count(), "falling back to local synthesis");
        let samples = self.synth.synthesize(text).await?;

        if !epochs.is_current(epoch) || scheduler.is_stopped() {
            debug!("fallback utterance superseded; discarding audio");
            return Ok(FallbackOutcome::Superseded);
        }
        if samples.is_empty() {
            return Ok(FallbackOutcome::Spoke { frames: 0 });
        }

        scheduler.enqueue(AudioFrame::new(samples, self.synth.sample_rate()));
        Ok(FallbackOutcome::Spoke { frames: 1 })
    }
}
