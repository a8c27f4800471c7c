//! Sample-accurate scheduling of decoded frames onto the output clock.
//!
//! The scheduler keeps a timeline indexed in output samples. The output
//! device pulls from it via [`AudioScheduler::render`]; the application
//! only appends future-timed frames via [`AudioScheduler::enqueue`].

use crate::frame::AudioFrame;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// A frame placed on the timeline at a fixed start position.
struct ScheduledFrame {
    /// Start position in samples since the scheduler was created.
    start: u64,
    samples: Vec<f32>,
}

impl ScheduledFrame {
    fn end(&self) -> u64 {
        self.start + self.samples.len() as u64
    }
}

/// Mutable timeline state, shared with the output callback.
struct Timeline {
    frames: VecDeque<ScheduledFrame>,
    /// Playback cursor: samples rendered so far.
    cursor: u64,
    /// End of the last scheduled frame.
    tail: u64,
    /// No further frames will be enqueued.
    ended: bool,
    /// Scheduler is permanently silenced.
    stopped: bool,
    /// Completion has fired; it never fires twice.
    completed: bool,
}

/// Schedules decoded audio frames back-to-back on a monotonic sample clock.
///
/// Frames are placed at the earliest position ≥ max(cursor, tail): no gap
/// and no overlap between consecutive frames regardless of delivery jitter.
/// When delivery falls behind playback the next frame starts at the current
/// cursor, producing an audible gap rather than dropped samples.
pub struct AudioScheduler {
    sample_rate: u32,
    state: Mutex<Timeline>,
    notify: Notify,
}

impl AudioScheduler {
    /// Create a scheduler for the given output sample rate.
    pub fn new(sample_rate: u32) -> Arc<Self> {
        Arc::new(Self {
            sample_rate,
            state: Mutex::new(Timeline {
                frames: VecDeque::new(),
                cursor: 0,
                tail: 0,
                ended: false,
                stopped: false,
                completed: false,
            }),
            notify: Notify::new(),
        })
    }

    /// Output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn lock(&self) -> MutexGuard<'_, Timeline> {
        // The only writers hold the lock for a few instructions; a poisoned
        // lock still carries consistent data.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a frame at the earliest position that neither overlaps the
    /// previous frame nor lies in the past. Silently dropped after
    /// [`AudioScheduler::stop`].
    pub fn enqueue(&self, frame: AudioFrame) {
        if frame.is_empty() {
            return;
        }
        if frame.sample_rate != self.sample_rate {
            warn!(
                frame_rate = frame.sample_rate,
                scheduler_rate = self.sample_rate,
                "enqueued frame with mismatched sample rate"
            );
        }

        let mut state = self.lock();
        if state.stopped {
            debug!("dropping frame enqueued after stop");
            return;
        }
        let start = state.cursor.max(state.tail);
        state.tail = start + frame.samples.len() as u64;
        state.frames.push_back(ScheduledFrame {
            start,
            samples: frame.samples,
        });
    }

    /// Fill `out` with scheduled samples at the playback cursor, silence
    /// where nothing is scheduled. Called by the output device.
    pub fn render(&self, out: &mut [f32]) {
        let mut state = self.lock();
        if state.stopped {
            out.fill(0.0);
            return;
        }

        for sample in out.iter_mut() {
            *sample = 0.0;
            while let Some(head) = state.frames.front() {
                if state.cursor >= head.end() {
                    state.frames.pop_front();
                    continue;
                }
                if state.cursor >= head.start {
                    let offset = (state.cursor - head.start) as usize;
                    *sample = head.samples[offset];
                }
                break;
            }
            state.cursor += 1;
        }

        // Drop a frame fully consumed by the last sample of this buffer.
        while let Some(head) = state.frames.front() {
            if state.cursor >= head.end() {
                state.frames.pop_front();
            } else {
                break;
            }
        }

        if state.ended && state.frames.is_empty() && !state.completed {
            state.completed = true;
            drop(state);
            self.notify.notify_waiters();
        }
    }

    /// Mark that no further frames will arrive. Completion fires once all
    /// pending frames have drained (immediately if none are pending).
    pub fn mark_ended(&self) {
        let mut state = self.lock();
        state.ended = true;
        if state.frames.is_empty() && !state.completed && !state.stopped {
            state.completed = true;
            drop(state);
            self.notify.notify_waiters();
        }
    }

    /// Permanently silence the scheduler: pending frames are discarded,
    /// future enqueues are dropped, and completion waiters are woken.
    /// Idempotent.
    pub fn stop(&self) {
        let mut state = self.lock();
        if state.stopped {
            return;
        }
        state.stopped = true;
        state.frames.clear();
        drop(state);
        self.notify.notify_waiters();
    }

    /// Whether [`AudioScheduler::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Whether completion has fired.
    pub fn is_complete(&self) -> bool {
        self.lock().completed
    }

    /// Number of frames scheduled but not yet fully played.
    pub fn pending(&self) -> usize {
        self.lock().frames.len()
    }

    /// Playback cursor position in samples.
    pub fn position(&self) -> u64 {
        self.lock().cursor
    }

    /// End of the scheduled timeline in samples.
    pub fn tail(&self) -> u64 {
        self.lock().tail
    }

    /// Wait until the stream has ended and all frames have drained, or the
    /// scheduler was stopped.
    pub async fn wait_complete(&self) {
        loop {
            let notified = self.notify.notified();
            {
                let state = self.lock();
                if state.completed || state.stopped {
                    return;
                }
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(len: usize) -> AudioFrame {
        AudioFrame::new(vec![0.5; len], 24_000)
    }

    #[test]
    fn frames_schedule_back_to_back() {
        let sched = AudioScheduler::new(24_000);
        sched.enqueue(frame(100));
        sched.enqueue(frame(250));
        sched.enqueue(frame(50));
        // Contiguous schedule: total span equals the sum of durations.
        assert_eq!(sched.tail(), 400);
        assert_eq!(sched.pending(), 3);
    }

    #[test]
    fn render_plays_scheduled_samples_then_silence() {
        let sched = AudioScheduler::new(24_000);
        sched.enqueue(frame(8));

        let mut out = vec![0.0f32; 12];
        sched.render(&mut out);
        assert!(out[..8].iter().all(|&s| (s - 0.5).abs() < 1e-6));
        assert!(out[8..].iter().all(|&s| s == 0.0));
        assert_eq!(sched.pending(), 0);
        assert_eq!(sched.position(), 12);
    }

    #[test]
    fn late_frame_starts_at_cursor_never_in_the_past() {
        let sched = AudioScheduler::new(24_000);
        sched.enqueue(frame(10));
        let mut out = vec![0.0f32; 40];
        sched.render(&mut out);
        // Delivery fell behind: cursor is at 40, past the old tail of 10.
        sched.enqueue(frame(10));
        assert_eq!(sched.tail(), 50);

        let mut out = vec![0.0f32; 10];
        sched.render(&mut out);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[tokio::test]
    async fn completion_fires_only_after_ended_and_drained() {
        let sched = AudioScheduler::new(24_000);
        sched.enqueue(frame(16));
        sched.mark_ended();
        assert!(!sched.is_complete());

        let mut out = vec![0.0f32; 8];
        sched.render(&mut out);
        assert!(!sched.is_complete());

        sched.render(&mut out);
        assert!(sched.is_complete());
        sched.wait_complete().await;
    }

    #[tokio::test]
    async fn completion_fires_immediately_when_nothing_pending() {
        let sched = AudioScheduler::new(24_000);
        sched.mark_ended();
        assert!(sched.is_complete());
        sched.wait_complete().await;
    }

    #[test]
    fn completion_fires_exactly_once() {
        let sched = AudioScheduler::new(24_000);
        sched.enqueue(frame(4));
        sched.mark_ended();
        let mut out = vec![0.0f32; 8];
        sched.render(&mut out);
        assert!(sched.is_complete());
        // Further renders and mark_ended calls must not re-fire.
        sched.render(&mut out);
        sched.mark_ended();
        assert!(sched.is_complete());
    }

    #[tokio::test]
    async fn stop_discards_frames_and_wakes_waiters() {
        let sched = AudioScheduler::new(24_000);
        sched.enqueue(frame(1000));

        let waiter = {
            let sched = Arc::clone(&sched);
            tokio::spawn(async move { sched.wait_complete().await })
        };
        // Give the waiter a chance to park.
        tokio::task::yield_now().await;

        sched.stop();
        assert!(waiter.await.is_ok());
        assert_eq!(sched.pending(), 0);
        assert!(sched.is_stopped());
        assert!(!sched.is_complete());
    }

    #[test]
    fn enqueue_after_stop_is_dropped() {
        let sched = AudioScheduler::new(24_000);
        sched.stop();
        sched.enqueue(frame(100));
        assert_eq!(sched.pending(), 0);

        let mut out = vec![1.0f32; 8];
        sched.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn empty_frame_is_ignored() {
        let sched = AudioScheduler::new(24_000);
        sched.enqueue(AudioFrame::new(Vec::new(), 24_000));
        assert_eq!(sched.pending(), 0);
        assert_eq!(sched.tail(), 0);
    }
}
