//! Top-level playback orchestrator.
//!
//! Owns the epoch counter, drives one streaming session per segment in
//! strict order into a shared scheduler, falls back to the local bridge on
//! failure or empty results, and exposes the stop/pause/resume surface.
//! Each orchestrator instance is independent: its epoch counter and output
//! device are private fields, never globals.

use crate::chunk;
use crate::config::EngineConfig;
use crate::epoch::EpochCounter;
use crate::error::{Result, SpeakError};
use crate::fallback::{FallbackBridge, FallbackOutcome, LocalSynth};
use crate::playback::{CpalOutput, OutputDevice, OutputHandle};
use crate::sched::AudioScheduler;
use crate::stream::{SegmentOutcome, SynthClient};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// How a playback request resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// All audio was played to the end.
    Completed,
    /// A later `stop()`/start superseded this playback; its remaining work
    /// was discarded silently. Not an error.
    Superseded,
}

/// How one item (a passage, or one dictation entry) resolved internally.
enum ItemOutcome {
    Completed,
    /// Epoch superseded: the playback no longer exists.
    Superseded,
    /// Scheduler silenced under the same epoch (dictation pause); the item
    /// index is retained and the item is re-spoken on resume.
    Interrupted,
}

/// Resources owned by the currently active playback.
struct ActiveState {
    scheduler: Option<Arc<AudioScheduler>>,
    output: Option<Box<dyn OutputHandle>>,
    /// Epoch that installed the current sink. A task may only tear down a
    /// sink it owns; a stale task must never touch a newer epoch's sink.
    sink_epoch: u64,
    paused: bool,
    dictating: bool,
    item_index: usize,
}

/// Streaming playback orchestrator.
pub struct Player {
    config: EngineConfig,
    epochs: EpochCounter,
    client: Option<SynthClient>,
    fallback: FallbackBridge,
    device: Arc<dyn OutputDevice>,
    active: Mutex<ActiveState>,
    paused_tx: watch::Sender<bool>,
}

impl Player {
    /// Create a player with an explicit output device.
    ///
    /// # Errors
    ///
    /// Returns an error if the synthesis client cannot be constructed from
    /// the configuration.
    pub fn new(
        config: EngineConfig,
        local: Box<dyn LocalSynth>,
        device: Arc<dyn OutputDevice>,
    ) -> Result<Self> {
        let client = match config.tts.api_url {
            Some(_) => Some(SynthClient::new(
                &config.tts,
                config.audio.output_sample_rate,
            )?),
            None => None,
        };
        let (paused_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            epochs: EpochCounter::new(),
            client,
            fallback: FallbackBridge::new(local),
            device,
            active: Mutex::new(ActiveState {
                scheduler: None,
                output: None,
                sink_epoch: 0,
                paused: false,
                dictating: false,
                item_index: 0,
            }),
            paused_tx,
        })
    }

    /// Create a player using the system's default (cpal) output.
    ///
    /// # Errors
    ///
    /// Returns an error if the synthesis client cannot be constructed.
    pub fn with_default_output(config: EngineConfig, local: Box<dyn LocalSynth>) -> Result<Self> {
        let device = Arc::new(CpalOutput::new(config.audio.clone()));
        Self::new(config, local, device)
    }

    /// The currently active epoch. Advances by exactly one per `stop()` or
    /// playback start.
    pub fn epoch(&self) -> u64 {
        self.epochs.current()
    }

    /// Whether dictation is currently paused.
    pub fn is_paused(&self) -> bool {
        self.lock_active().paused
    }

    /// Index of the dictation item currently (or next) being spoken.
    pub fn current_item_index(&self) -> usize {
        self.lock_active().item_index
    }

    /// Speak a full passage with the configured voice.
    ///
    /// Implicitly stops any playback in progress first.
    ///
    /// # Errors
    ///
    /// Returns [`SpeakError::FallbackExhausted`] only when both the remote
    /// engine and the fallback bridge fail.
    pub async fn speak(&self, text: &str) -> Result<PlaybackOutcome> {
        self.speak_with_voice(text, None).await
    }

    /// Speak a full passage, optionally overriding the configured voice.
    ///
    /// # Errors
    ///
    /// See [`Player::speak`].
    pub async fn speak_with_voice(
        &self,
        text: &str,
        voice: Option<&str>,
    ) -> Result<PlaybackOutcome> {
        self.stop();
        let epoch = self.epochs.current();
        if text.trim().is_empty() {
            return Ok(PlaybackOutcome::Completed);
        }
        info!(epoch, chars = text.chars().count(), "starting passage playback");

        match self.run_item(text, voice, epoch).await? {
            ItemOutcome::Completed => Ok(PlaybackOutcome::Completed),
            ItemOutcome::Superseded | ItemOutcome::Interrupted => Ok(PlaybackOutcome::Superseded),
        }
    }

    /// Speak a sequence of discrete items with a configurable pause between
    /// them (dictation mode). Pause/resume operate on this mode only.
    ///
    /// A failing item is reported and skipped; it never aborts the rest of
    /// the sequence.
    ///
    /// # Errors
    ///
    /// Currently infallible at the sequence level; per-item failures are
    /// logged and skipped.
    pub async fn dictate(&self, items: &[String]) -> Result<PlaybackOutcome> {
        self.stop();
        let epoch = self.epochs.current();
        {
            let mut state = self.lock_active();
            state.dictating = true;
            state.paused = false;
            state.item_index = 0;
        }
        let _ = self.paused_tx.send(false);
        let mut paused_rx = self.paused_tx.subscribe();
        let interval = Duration::from_secs(self.config.dictation.interval_secs);
        info!(epoch, items = items.len(), "starting dictation playback");

        let mut index = 0;
        let mut outcome = PlaybackOutcome::Completed;
        'items: while index < items.len() {
            if !self.epochs.is_current(epoch) {
                outcome = PlaybackOutcome::Superseded;
                break;
            }

            // Park while paused; resume re-enters at the retained index.
            while *paused_rx.borrow_and_update() {
                if paused_rx.changed().await.is_err() || !self.epochs.is_current(epoch) {
                    outcome = PlaybackOutcome::Superseded;
                    break 'items;
                }
            }

            self.lock_active().item_index = index;
            match self.run_item(&items[index], None, epoch).await {
                Ok(ItemOutcome::Completed) => {}
                Ok(ItemOutcome::Interrupted) => continue 'items,
                Ok(ItemOutcome::Superseded) => {
                    outcome = PlaybackOutcome::Superseded;
                    break;
                }
                Err(e) => {
                    // One item's failure never aborts the queued sequence.
                    warn!(item = index, "dictation item failed: {e}");
                }
            }

            index += 1;
            if index < items.len() {
                // Advance the observable index as soon as an item finishes,
                // so a pause landing in the gap reports the pending item.
                self.lock_active().item_index = index;
                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    // A pause or stop cancels the inter-item delay.
                    _ = paused_rx.changed() => {}
                }
            }
        }

        if self.epochs.is_current(epoch) {
            self.close_sink(epoch);
            let mut state = self.lock_active();
            state.dictating = false;
            state.paused = false;
        } else {
            outcome = PlaybackOutcome::Superseded;
        }
        Ok(outcome)
    }

    /// Stop playback: advance the epoch (exactly once), discard scheduled
    /// audio, and release the output device. Safe to call redundantly.
    pub fn stop(&self) {
        let epoch = self.epochs.advance();
        debug!(epoch, "stopping playback");
        let mut state = self.lock_active();
        if let Some(scheduler) = state.scheduler.take() {
            scheduler.stop();
        }
        state.output = None;
        state.paused = false;
        state.dictating = false;
        drop(state);
        // Wakes paused loops and pending delay timers so they can observe
        // the stale epoch.
        let _ = self.paused_tx.send(false);
    }

    /// Pause dictation without invalidating it: the epoch is unchanged and
    /// the current item index is retained. No-op outside dictation mode or
    /// when already paused.
    pub fn pause(&self) {
        let mut state = self.lock_active();
        if !state.dictating || state.paused {
            return;
        }
        state.paused = true;
        if let Some(scheduler) = &state.scheduler {
            scheduler.stop();
        }
        state.output = None;
        drop(state);
        let _ = self.paused_tx.send(true);
        info!("dictation paused");
    }

    /// Resume a paused dictation from the retained item index, under the
    /// same epoch. No-op when not paused.
    pub fn resume(&self) {
        let mut state = self.lock_active();
        if !state.dictating || !state.paused {
            return;
        }
        state.paused = false;
        drop(state);
        let _ = self.paused_tx.send(false);
        info!("dictation resumed");
    }

    fn lock_active(&self) -> MutexGuard<'_, ActiveState> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Release the scheduler and output device, but only if `epoch` still
    /// owns them. A sink installed by a newer epoch is left alone.
    fn close_sink(&self, epoch: u64) {
        let mut state = self.lock_active();
        if state.sink_epoch != epoch {
            return;
        }
        if let Some(scheduler) = state.scheduler.take() {
            scheduler.stop();
        }
        state.output = None;
    }

    /// Open a fresh scheduler and output device for `epoch`, replacing the
    /// previous sink. The epoch check and the swap happen in one critical
    /// section: a stale task returns `None` without touching the sink a
    /// newer epoch has installed, and the old device is fully released
    /// before the new one opens, so two devices never coexist.
    fn open_sink(&self, epoch: u64) -> Result<Option<Arc<AudioScheduler>>> {
        let mut state = self.lock_active();
        if !self.epochs.is_current(epoch) {
            return Ok(None);
        }
        if let Some(old) = state.scheduler.take() {
            old.stop();
        }
        // Dropping the handle joins the old device thread.
        state.output = None;

        let scheduler = AudioScheduler::new(self.config.audio.output_sample_rate);
        let output = self.device.open(Arc::clone(&scheduler))?;
        state.scheduler = Some(Arc::clone(&scheduler));
        state.output = Some(output);
        state.sink_epoch = epoch;
        Ok(Some(scheduler))
    }

    /// Distinguish a superseding stop from a same-epoch pause.
    fn interrupted_outcome(&self, epoch: u64) -> ItemOutcome {
        if self.epochs.is_current(epoch) {
            ItemOutcome::Interrupted
        } else {
            ItemOutcome::Superseded
        }
    }

    /// Wait for the scheduler to drain, then release it if this playback
    /// still owns the epoch.
    async fn finish_item(&self, scheduler: &Arc<AudioScheduler>, epoch: u64) -> ItemOutcome {
        scheduler.mark_ended();
        scheduler.wait_complete().await;
        if !self.epochs.is_current(epoch) {
            return ItemOutcome::Superseded;
        }
        if !scheduler.is_complete() {
            // Stopped without completing: a pause under the same epoch.
            return ItemOutcome::Interrupted;
        }
        self.close_sink(epoch);
        ItemOutcome::Completed
    }

    /// Speak one item through the ordered strategy list: remote streaming
    /// first, then the local fallback with the item's full text.
    async fn run_item(
        &self,
        text: &str,
        voice: Option<&str>,
        epoch: u64,
    ) -> Result<ItemOutcome> {
        let mut remote_failure: Option<String> = None;

        if let Some(client) = &self.client {
            let Some(scheduler) = self.open_sink(epoch)? else {
                return Ok(ItemOutcome::Superseded);
            };
            let segments = chunk::split(text, &self.config.chunk);
            debug!(segments = segments.len(), "streaming item");

            let mut frames = 0usize;
            let mut failed = false;
            // Strict order: segment N+1 is not sent before segment N's
            // session reports Done, so frames never interleave.
            for segment in &segments {
                if !self.epochs.is_current(epoch) {
                    return Ok(ItemOutcome::Superseded);
                }
                if scheduler.is_stopped() {
                    return Ok(self.interrupted_outcome(epoch));
                }
                match client
                    .stream_segment(&segment.text, voice, &self.epochs, epoch, &scheduler)
                    .await
                {
                    Ok(SegmentOutcome::Done { frames: n }) => frames += n,
                    Ok(SegmentOutcome::Superseded) => {
                        return Ok(self.interrupted_outcome(epoch));
                    }
                    Err(e) => {
                        warn!(segment = segment.index, "remote synthesis failed: {e}");
                        remote_failure = Some(e.to_string());
                        failed = true;
                        break;
                    }
                }
            }

            if !failed {
                if frames == 0 {
                    // Zero frames across the whole item: treat like a
                    // transport failure and fall back with the full text.
                    warn!("remote engine produced no audio for item");
                    remote_failure = Some(SpeakError::EmptyResult.to_string());
                } else {
                    return Ok(self.finish_item(&scheduler, epoch).await);
                }
            }
        } else {
            remote_failure = Some("remote engine not configured".to_string());
        }

        // Fallback strategy: the item's full original text, never a
        // partial segment.
        let Some(scheduler) = self.open_sink(epoch)? else {
            return Ok(ItemOutcome::Superseded);
        };
        match self
            .fallback
            .speak(text, &self.epochs, epoch, &scheduler)
            .await
        {
            Ok(FallbackOutcome::Spoke { .. }) => Ok(self.finish_item(&scheduler, epoch).await),
            Ok(FallbackOutcome::Superseded) => Ok(self.interrupted_outcome(epoch)),
            Err(e) => {
                self.close_sink(epoch);
                Err(SpeakError::FallbackExhausted {
                    remote: remote_failure.unwrap_or_else(|| "not attempted".into()),
                    fallback: e.to_string(),
                })
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        // Release the device and silence any in-flight work.
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::SilenceSynth;
    use crate::playback::NullOutput;

    fn offline_player() -> Player {
        let config = EngineConfig::default();
        let rate = config.audio.output_sample_rate;
        Player::new(
            config,
            Box::new(SilenceSynth::new(rate)),
            Arc::new(NullOutput::unpaced()),
        )
        .expect("player construction")
    }

    #[test]
    fn stop_n_times_advances_epoch_by_n() {
        let player = offline_player();
        let before = player.epoch();
        for _ in 0..5 {
            player.stop();
        }
        assert_eq!(player.epoch(), before + 5);
    }

    #[test]
    fn pause_and_resume_are_no_ops_outside_dictation() {
        let player = offline_player();
        let epoch = player.epoch();
        player.pause();
        player.pause();
        player.resume();
        assert_eq!(player.epoch(), epoch);
        assert!(!player.is_paused());
    }

    #[tokio::test]
    async fn speak_without_remote_engine_uses_fallback() {
        let player = offline_player();
        let outcome = player.speak("没有远端引擎").await.expect("speak");
        assert_eq!(outcome, PlaybackOutcome::Completed);
    }

    #[tokio::test]
    async fn empty_text_completes_immediately() {
        let player = offline_player();
        let outcome = player.speak("   ").await.expect("speak");
        assert_eq!(outcome, PlaybackOutcome::Completed);
    }

    #[tokio::test]
    async fn dictation_speaks_every_item() {
        let mut config = EngineConfig::default();
        config.dictation.interval_secs = 0;
        let rate = config.audio.output_sample_rate;
        let player = Player::new(
            config,
            Box::new(SilenceSynth::new(rate)),
            Arc::new(NullOutput::unpaced()),
        )
        .expect("player construction");

        let items = vec!["苹果".to_string(), "香蕉".to_string()];
        let outcome = player.dictate(&items).await.expect("dictate");
        assert_eq!(outcome, PlaybackOutcome::Completed);
        assert!(!player.is_paused());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_speaks_never_both_lose() {
        // Two racing speaks may supersede each other in either order, but
        // the winning epoch's playback must never be torn down by the
        // stale task: at least one of them always completes.
        for round in 0..200 {
            let player = Arc::new(offline_player());

            let first = {
                let player = Arc::clone(&player);
                tokio::spawn(async move { player.speak("甲").await })
            };
            let second = {
                let player = Arc::clone(&player);
                tokio::spawn(async move { player.speak("乙").await })
            };

            let first = first.await.expect("join").expect("speak");
            let second = second.await.expect("join").expect("speak");
            assert!(
                first == PlaybackOutcome::Completed || second == PlaybackOutcome::Completed,
                "round {round}: both concurrent speaks resolved Superseded"
            );
        }
    }

    #[tokio::test]
    async fn stop_supersedes_in_flight_playback() {
        // A realtime-paced output keeps the utterance in flight long enough
        // for the stop to land mid-playback.
        let config = EngineConfig::default();
        let rate = config.audio.output_sample_rate;
        let player = Arc::new(
            Player::new(
                config,
                Box::new(SilenceSynth::new(rate)),
                Arc::new(NullOutput::realtime(rate)),
            )
            .expect("player construction"),
        );

        let speaking = {
            let player = Arc::clone(&player);
            tokio::spawn(async move { player.speak("一段比较长的文本需要一些时间来播放完成").await })
        };
        // Let the playback start scheduling.
        tokio::time::sleep(Duration::from_millis(20)).await;
        player.stop();

        let outcome = speaking.await.expect("join").expect("speak");
        assert_eq!(outcome, PlaybackOutcome::Superseded);
    }
}
