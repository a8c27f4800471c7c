//! Tingxie: streaming Chinese speech playback for dictation practice.
//!
//! Text goes in, speech comes out of the speakers with minimal latency:
//! long passages are split into transport-sized segments, each segment is
//! synthesized by a streaming remote engine, and audio frames are scheduled
//! gaplessly on a sample-accurate timeline as they arrive. A local fallback
//! engine covers remote failures, and an epoch counter makes cancellation
//! race-free: stale audio is discarded silently, never played.
//!
//! # Architecture
//!
//! - **Chunking**: [`chunk::split`] sizes text to the request byte budget
//! - **Streaming**: [`stream::SynthClient`] decodes NDJSON audio records
//!   incrementally
//! - **Scheduling**: [`sched::AudioScheduler`] owns the gapless timeline
//! - **Output**: [`playback::CpalOutput`] drains the scheduler via `cpal`
//! - **Orchestration**: [`player::Player`] ties it together and adds
//!   dictation mode with pause/resume
//! - **Supplements**: [`ocr`] recognizes word lists from images and
//!   [`words`] segments them into dictation items

pub mod chunk;
pub mod config;
pub mod epoch;
pub mod error;
pub mod fallback;
pub mod frame;
pub mod ocr;
pub mod playback;
pub mod player;
pub mod records;
pub mod sched;
pub mod stream;
pub mod words;

pub use config::EngineConfig;
pub use error::{Result, SpeakError};
pub use fallback::{LocalSynth, SilenceSynth};
pub use player::{PlaybackOutcome, Player};
