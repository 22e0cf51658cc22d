// Audio output using cpal
// Mixes every playing source into the default output device

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

use super::device::{
    AudioDevice, BufferId, DeviceError, DeviceResult, SampleFormat, SourceId, SourceState,
};
use super::sources::{BufferData, SourceTable};

/// [`AudioDevice`] backed by the system's default cpal output.
///
/// cpal streams are not `Send` on every platform, so the stream lives on its
/// own thread for the lifetime of the device. Sources and buffers live in a
/// shared table that the stream callback renders from.
pub struct CpalDevice {
    table: Arc<Mutex<SourceTable>>,
    sample_rate: u32,
    channels: u16,
    shutdown: Option<Sender<()>>,
    stream_thread: Option<JoinHandle<()>>,
}

impl CpalDevice {
    /// Open the default output device and start its stream.
    pub fn new() -> DeviceResult<Self> {
        let table = Arc::new(Mutex::new(SourceTable::new()));
        let (ready_tx, ready_rx) = bounded::<DeviceResult<(u32, u16)>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let stream_table = Arc::clone(&table);
        let stream_thread = thread::Builder::new()
            .name("cpal-output".to_string())
            .spawn(move || {
                let stream = match Self::open_stream(stream_table) {
                    Ok((stream, rate, channels)) => {
                        let _ = ready_tx.send(Ok((rate, channels)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Keep the stream alive until the device is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!("Output stream closed");
            })
            .map_err(|e| DeviceError::Backend(format!("Failed to spawn output thread: {}", e)))?;

        let (sample_rate, channels) = ready_rx
            .recv()
            .map_err(|_| DeviceError::Backend("Output thread exited during startup".to_string()))??;

        info!(sample_rate, channels, "Opened audio output");

        Ok(Self {
            table,
            sample_rate,
            channels,
            shutdown: Some(shutdown_tx),
            stream_thread: Some(stream_thread),
        })
    }

    fn open_stream(table: Arc<Mutex<SourceTable>>) -> DeviceResult<(Stream, u32, u16)> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| DeviceError::Backend("No output device available".to_string()))?;

        let config = device
            .default_output_config()
            .map_err(|e| DeviceError::Backend(format!("Failed to get default output config: {}", e)))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        // Build the output stream based on sample format
        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => Self::build_stream::<f32>(&device, &config.into(), table)?,
            cpal::SampleFormat::I16 => Self::build_stream::<i16>(&device, &config.into(), table)?,
            cpal::SampleFormat::U16 => Self::build_stream::<u16>(&device, &config.into(), table)?,
            format => {
                return Err(DeviceError::Unsupported(format!(
                    "sample format {:?}",
                    format
                )))
            }
        };

        stream
            .play()
            .map_err(|e| DeviceError::Backend(format!("Failed to start stream: {}", e)))?;

        Ok((stream, sample_rate, channels))
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        table: Arc<Mutex<SourceTable>>,
    ) -> DeviceResult<Stream> {
        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0;
        let mut mix: Vec<f32> = Vec::new();

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if mix.len() != data.len() {
                        mix.resize(data.len(), 0.0);
                    }
                    table.lock().render(&mut mix, channels, sample_rate);
                    for (out, value) in data.iter_mut().zip(mix.iter()) {
                        *out = T::from_sample(*value);
                    }
                },
                move |err| {
                    error!("Audio output error: {}", err);
                },
                None,
            )
            .map_err(|e| DeviceError::Backend(format!("Failed to build output stream: {}", e)))?;

        Ok(stream)
    }

    /// Get the output sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the number of output channels
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.stream_thread.take() {
            if handle.join().is_err() {
                error!("Output thread panicked");
            }
        }
    }
}

impl AudioDevice for CpalDevice {
    fn create_source(&self) -> DeviceResult<SourceId> {
        Ok(self.table.lock().create_source())
    }

    fn delete_source(&self, source: SourceId) -> DeviceResult<()> {
        self.table.lock().delete_source(source)
    }

    fn create_buffers(&self, count: usize) -> DeviceResult<Vec<BufferId>> {
        Ok(self.table.lock().create_buffers(count))
    }

    fn delete_buffers(&self, buffers: &[BufferId]) -> DeviceResult<()> {
        self.table.lock().delete_buffers(buffers)
    }

    fn buffer_data(
        &self,
        buffer: BufferId,
        format: SampleFormat,
        data: &[i16],
        sample_rate: u32,
    ) -> DeviceResult<()> {
        if sample_rate == 0 {
            return Err(DeviceError::Unsupported("sample rate 0".to_string()));
        }
        self.table.lock().buffer_data(
            buffer,
            BufferData {
                format,
                samples: data.to_vec(),
                sample_rate,
            },
        )
    }

    fn queue_buffers(&self, source: SourceId, buffers: &[BufferId]) -> DeviceResult<()> {
        self.table.lock().queue_buffers(source, buffers)
    }

    fn unqueue_buffers(&self, source: SourceId, count: usize) -> DeviceResult<Vec<BufferId>> {
        self.table.lock().unqueue_buffers(source, count)
    }

    fn play(&self, source: SourceId) -> DeviceResult<()> {
        self.table.lock().play(source)
    }

    fn pause(&self, source: SourceId) -> DeviceResult<()> {
        self.table.lock().pause(source)
    }

    fn stop(&self, source: SourceId) -> DeviceResult<()> {
        self.table.lock().stop(source)
    }

    fn buffers_processed(&self, source: SourceId) -> DeviceResult<usize> {
        Ok(self.table.lock().source(source)?.processed())
    }

    fn source_state(&self, source: SourceId) -> DeviceResult<SourceState> {
        Ok(self.table.lock().source(source)?.state)
    }

    fn set_gain(&self, source: SourceId, gain: f32) -> DeviceResult<()> {
        self.table.lock().set_gain(source, gain.clamp(0.0, 1.0))
    }
}
