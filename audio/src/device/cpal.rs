//! Platform audio devices via cpal.
//!
//! cpal streams are not `Send` on every platform, so each acquired stream
//! is owned by a dedicated worker thread. The worker builds and plays the
//! stream, then parks until it is told to stop, at which point the stream
//! is dropped and the device released.
//!
//! Capture downmixes whatever channel layout the device offers to mono.
//! Playback renders scheduled frames against a sample-accurate clock: the
//! output callback counts rendered frames, and that counter is the device
//! clock the scheduler reads. Scheduled frames reach the callback through a
//! lock-free `rtrb` ring; clearing bumps an epoch so the callback skips
//! everything queued before it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use tracing::{error, info, warn};

use super::{DeviceClock, InputDevice, InputStream, OutputDevice, OutputStream};
use crate::capture::CaptureSink;
use crate::error::{Error, Result};
use crate::pcm::{AudioFrame, Format, i16_to_f32};

/// Frames the output ring can hold before scheduling starts dropping.
const SCHEDULE_RING_CAPACITY: usize = 256;

fn unavailable(context: &str, e: impl std::fmt::Display) -> Error {
    Error::DeviceUnavailable(format!("{}: {}", context, e))
}

/// A parked thread that owns a platform stream.
struct Worker {
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns a worker that builds a stream with `build`, plays it and
    /// holds it until stopped. Returns once the stream is playing.
    fn spawn<F>(name: &str, build: F) -> Result<Self>
    where
        F: FnOnce() -> Result<cpal::Stream> + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(unavailable("failed to play stream", e)));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Sender dropped or stop requested.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| unavailable("failed to spawn audio thread", e))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop_tx: Some(stop_tx),
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::DeviceUnavailable("audio thread exited".to_string()))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn stream_config(channels: u16, format: Format) -> StreamConfig {
    StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(format.sample_rate()),
        buffer_size: cpal::BufferSize::Default,
    }
}

// ============================================================================
// Input
// ============================================================================

/// The host's default microphone.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalInput;

impl InputDevice for CpalInput {
    fn name(&self) -> String {
        cpal::default_host()
            .default_input_device()
            .and_then(|d| d.name().ok())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn acquire(&self, format: Format) -> Result<Box<dyn InputStream>> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::DeviceUnavailable("no input device available".to_string()))?;
        let supported = device
            .default_input_config()
            .map_err(|e| unavailable("failed to get default input config", e))?;

        info!(
            "using input device: {} ({:?})",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            supported
        );

        Ok(Box::new(CpalInputStream {
            format,
            channels: supported.channels(),
            sample_format: supported.sample_format(),
            worker: None,
        }))
    }
}

struct CpalInputStream {
    format: Format,
    channels: u16,
    sample_format: SampleFormat,
    worker: Option<Worker>,
}

impl InputStream for CpalInputStream {
    fn start(&mut self, sink: CaptureSink) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::AlreadyStarted);
        }
        let config = stream_config(self.channels, self.format);
        let sample_format = self.sample_format;

        let worker = Worker::spawn("concierge-capture", move || {
            let device = cpal::default_host()
                .default_input_device()
                .ok_or_else(|| Error::DeviceUnavailable("input device disappeared".to_string()))?;
            match sample_format {
                SampleFormat::I16 => build_input_stream::<i16>(&device, &config, sink),
                SampleFormat::U16 => build_input_stream::<u16>(&device, &config, sink),
                SampleFormat::F32 => build_input_stream::<f32>(&device, &config, sink),
                other => Err(Error::DeviceUnavailable(format!(
                    "unsupported input sample format: {:?}",
                    other
                ))),
            }
        })?;
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut sink: CaptureSink,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                for frame in data.chunks_exact(channels) {
                    let sum: f32 = frame.iter().map(|&s| f32::from_sample(s)).sum();
                    sink.push_sample(sum / channels as f32);
                }
            },
            move |err| {
                error!("audio capture error: {}", err);
            },
            None,
        )
        .map_err(|e| unavailable("failed to build input stream", e))
}

// ============================================================================
// Output
// ============================================================================

/// The host's default speaker.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalOutput;

impl OutputDevice for CpalOutput {
    fn name(&self) -> String {
        cpal::default_host()
            .default_output_device()
            .and_then(|d| d.name().ok())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn acquire(&self, format: Format) -> Result<Box<dyn OutputStream>> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::DeviceUnavailable("no output device available".to_string()))?;
        let supported = device
            .default_output_config()
            .map_err(|e| unavailable("failed to get default output config", e))?;

        info!(
            "using output device: {} ({:?})",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            supported
        );

        let config = stream_config(supported.channels(), format);
        let sample_format = supported.sample_format();
        let position = Arc::new(AtomicU64::new(0));
        let epoch = Arc::new(AtomicU64::new(0));
        let (producer, consumer) = rtrb::RingBuffer::<Segment>::new(SCHEDULE_RING_CAPACITY);

        let renderer = Renderer {
            consumer,
            current: None,
            offset: 0,
            position: position.clone(),
            epoch: epoch.clone(),
        };
        let worker = Worker::spawn("concierge-playback", move || {
            let device = cpal::default_host()
                .default_output_device()
                .ok_or_else(|| Error::DeviceUnavailable("output device disappeared".to_string()))?;
            match sample_format {
                SampleFormat::I16 => build_output_stream::<i16>(&device, &config, renderer),
                SampleFormat::U16 => build_output_stream::<u16>(&device, &config, renderer),
                SampleFormat::F32 => build_output_stream::<f32>(&device, &config, renderer),
                other => Err(Error::DeviceUnavailable(format!(
                    "unsupported output sample format: {:?}",
                    other
                ))),
            }
        })?;

        Ok(Box::new(CpalOutputStream {
            format,
            producer,
            position,
            epoch,
            worker: Some(worker),
        }))
    }
}

/// A frame placed at an absolute sample position.
struct Segment {
    start_frame: u64,
    frame: AudioFrame,
    epoch: u64,
}

/// State owned by the output callback.
struct Renderer {
    consumer: rtrb::Consumer<Segment>,
    current: Option<Segment>,
    offset: usize,
    position: Arc<AtomicU64>,
    epoch: Arc<AtomicU64>,
}

impl Renderer {
    /// Returns the sample to render at device position `pos`.
    fn next_sample(&mut self, pos: u64, epoch: u64) -> i16 {
        loop {
            if self.current.as_ref().is_some_and(|s| s.epoch != epoch) {
                self.current = None;
            }
            if self.current.is_none() {
                match self.consumer.pop() {
                    Ok(seg) if seg.epoch == epoch => {
                        self.current = Some(seg);
                        self.offset = 0;
                    }
                    Ok(_) => continue,
                    Err(_) => return 0,
                }
            }

            let Some(seg) = self.current.as_ref() else {
                return 0;
            };
            if self.offset == 0 && seg.start_frame > pos {
                return 0;
            }
            let channels = seg.frame.format().channels() as usize;
            let samples = seg.frame.samples();
            let index = self.offset * channels;
            if index < samples.len() {
                self.offset += 1;
                return samples[index];
            }
            self.current = None;
        }
    }
}

fn build_output_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut renderer: Renderer,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let epoch = renderer.epoch.load(Ordering::Acquire);
                let mut pos = renderer.position.load(Ordering::Relaxed);
                for slot in data.chunks_mut(channels) {
                    let value = T::from_sample(i16_to_f32(renderer.next_sample(pos, epoch)));
                    for s in slot.iter_mut() {
                        *s = value;
                    }
                    pos += 1;
                }
                renderer.position.store(pos, Ordering::Release);
            },
            move |err| {
                error!("audio playback error: {}", err);
            },
            None,
        )
        .map_err(|e| unavailable("failed to build output stream", e))
}

struct CpalOutputStream {
    format: Format,
    producer: rtrb::Producer<Segment>,
    position: Arc<AtomicU64>,
    epoch: Arc<AtomicU64>,
    worker: Option<Worker>,
}

impl DeviceClock for CpalOutputStream {
    fn now(&self) -> Duration {
        self.format
            .frames_duration(self.position.load(Ordering::Acquire))
    }
}

impl OutputStream for CpalOutputStream {
    fn format(&self) -> Format {
        self.format
    }

    fn schedule(&mut self, frame: AudioFrame, start: Duration) -> Result<()> {
        if self.worker.is_none() {
            return Err(Error::Closed);
        }
        let start_frame =
            (start.as_nanos() * self.format.sample_rate() as u128 / 1_000_000_000) as u64;
        let segment = Segment {
            start_frame,
            frame,
            epoch: self.epoch.load(Ordering::Acquire),
        };
        if self.producer.push(segment).is_err() {
            warn!("playback ring full, dropping frame at {:?}", start);
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    fn close(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            self.clear();
            worker.stop();
        }
    }
}

impl Drop for CpalOutputStream {
    fn drop(&mut self) {
        self.close();
    }
}
