//! Audio output devices that drain an [`AudioScheduler`].
//!
//! The scheduler exposes a pull model; a device repeatedly calls
//! [`AudioScheduler::render`] to fill its output buffers. Dropping the
//! returned handle releases the device, so at most one device exists per
//! playback epoch.

use crate::config::AudioConfig;
use crate::error::{Result, SpeakError};
use crate::sched::AudioScheduler;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{error, info};

/// Opens an output device that drains a scheduler until the handle drops.
pub trait OutputDevice: Send + Sync {
    /// Start draining `scheduler`. The device is released when the returned
    /// handle is dropped.
    fn open(&self, scheduler: Arc<AudioScheduler>) -> Result<Box<dyn OutputHandle>>;
}

/// Handle to a running output device; dropping it stops and releases the
/// device.
pub trait OutputHandle: Send {}

/// System speaker output via cpal.
pub struct CpalOutput {
    config: AudioConfig,
}

impl CpalOutput {
    /// Create a cpal output for the configured device and sample rate.
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| SpeakError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }

    fn find_device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();
        if let Some(ref name) = self.config.output_device {
            host.output_devices()
                .map_err(|e| SpeakError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| SpeakError::Audio(format!("output device '{name}' not found")))
        } else {
            host.default_output_device()
                .ok_or_else(|| SpeakError::Audio("no default output device".into()))
        }
    }
}

impl OutputDevice for CpalOutput {
    fn open(&self, scheduler: Arc<AudioScheduler>) -> Result<Box<dyn OutputHandle>> {
        let device = self.find_device()?;
        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using output device: {device_name}");

        let stream_config = StreamConfig {
            channels: 1,
            sample_rate: self.config.output_sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        // cpal streams are not Send; a dedicated thread owns the stream for
        // the handle's whole lifetime.
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let join = std::thread::spawn(move || {
            let stream = device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    scheduler.render(data);
                },
                move |err| {
                    error!("audio output stream error: {err}");
                },
                None,
            );

            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(SpeakError::Audio(format!(
                        "failed to build output stream: {e}"
                    ))));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(SpeakError::Audio(format!(
                    "failed to start output stream: {e}"
                ))));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Block until the handle drops, then release the stream.
            let _ = stop_rx.recv();
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = join.join();
                return Err(e);
            }
            Err(_) => {
                let _ = join.join();
                return Err(SpeakError::Audio("output thread exited early".into()));
            }
        }

        Ok(Box::new(ThreadedHandle {
            stop_tx: Some(stop_tx),
            join: Some(join),
        }))
    }
}

/// Stop channel plus join handle for a device drain thread; shared by the
/// cpal and headless outputs.
struct ThreadedHandle {
    stop_tx: Option<mpsc::Sender<()>>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl OutputHandle for ThreadedHandle {}

impl Drop for ThreadedHandle {
    fn drop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Headless output: drains the scheduler on a background thread without a
/// sound card. Useful for tests and for driving playback logic on machines
/// with no audio device.
pub struct NullOutput {
    /// Samples consumed per render call.
    chunk: usize,
    /// Pause between render calls; `Duration::ZERO` drains as fast as the
    /// thread is scheduled.
    pace: Duration,
}

impl NullOutput {
    /// Drain at roughly real-time rate for `sample_rate`.
    pub fn realtime(sample_rate: u32) -> Self {
        // 10 ms buffers, like a typical device period.
        Self {
            chunk: (sample_rate / 100).max(1) as usize,
            pace: Duration::from_millis(10),
        }
    }

    /// Drain as fast as possible.
    pub fn unpaced() -> Self {
        Self {
            chunk: 1024,
            pace: Duration::from_micros(100),
        }
    }
}

impl OutputDevice for NullOutput {
    fn open(&self, scheduler: Arc<AudioScheduler>) -> Result<Box<dyn OutputHandle>> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let chunk = self.chunk;
        let pace = self.pace;

        let join = std::thread::spawn(move || {
            let mut buffer = vec![0.0f32; chunk];
            loop {
                match stop_rx.recv_timeout(pace) {
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                }
                scheduler.render(&mut buffer);
            }
        });

        Ok(Box::new(ThreadedHandle {
            stop_tx: Some(stop_tx),
            join: Some(join),
        }))
    }
}
