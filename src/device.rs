//! The `cpal` device callback boundary (spec §6.4), feature-gated behind
//! `cpal-backend`.
//!
//! Grounded on `tutti-core::output::{AudioEngine, build_stream}`: device
//! enumeration/selection, a pre-allocated `f32` scratch buffer sized for
//! the largest buffer size cpal is expected to request, `catch_unwind`
//! around the callback body with silence-on-panic, and format dispatch
//! over `cpal::SampleFormat`.

#![cfg(feature = "cpal-backend")]

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::engine::AudioEngine;
use crate::error::{Error, Result};

/// Largest frame count a single cpal callback is expected to request;
/// bounds the pre-allocated scratch buffer so the callback never
/// allocates.
const MAX_CALLBACK_FRAMES: usize = 8192;

/// Wrapper to hold `cpal::Stream` in a `Send` context — `cpal::Stream` is
/// `!Send` on some platforms due to internal handles, but the stream is
/// never touched except through `Drop`/`play`/`pause` from the thread that
/// owns this `DeviceStream`.
struct StreamHandle(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for StreamHandle {}

pub struct DeviceStream {
    sample_rate: f64,
    channels: usize,
    stream: StreamHandle,
}

impl DeviceStream {
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn play(&self) -> Result<()> {
        self.stream.0.play().map_err(Error::from)
    }

    pub fn pause(&self) -> Result<()> {
        self.stream.0.pause().map_err(Error::from)
    }
}

pub fn list_output_devices() -> Result<Vec<String>> {
    cpal::default_host()
        .output_devices()?
        .enumerate()
        .map(|(i, d)| Ok(format!("{i}: {}", d.name()?)))
        .collect()
}

fn get_device(index: Option<usize>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match index {
        Some(i) => {
            let devices: Vec<_> = host.output_devices()?.collect();
            let count = devices.len();
            devices
                .into_iter()
                .nth(i)
                .ok_or_else(|| Error::InvalidDevice(format!("device index {i} out of {count} available")))
        }
        None => host
            .default_output_device()
            .ok_or_else(|| Error::InvalidDevice("no default output device".into())),
    }
}

/// Open the output device and start driving `engine.render` from its
/// callback. `engine` must outlive the returned `DeviceStream`.
pub fn open_stream(device_index: Option<usize>, engine: AudioEngine) -> Result<DeviceStream> {
    let device = get_device(device_index)?;
    let config = device.default_output_config()?;
    let channels = config.channels() as usize;
    let sample_rate = config.sample_rate().0 as f64;

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), engine)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), engine)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), engine)?,
        format => {
            return Err(Error::InvalidConfig(format!(
                "unsupported sample format: {format:?}"
            )))
        }
    };

    Ok(DeviceStream {
        sample_rate,
        channels,
        stream: StreamHandle(stream),
    })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut engine: AudioEngine,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch = vec![0.0f32; MAX_CALLBACK_FRAMES * 2];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let frames = (data.len() / channels).min(MAX_CALLBACK_FRAMES);
                let needed = frames * 2;
                engine.render(&mut scratch[..needed], frames);
                write_output(data, channels, &scratch[..needed]);
            }));
            if result.is_err() {
                output_silence(data);
            }
        },
        |_err| {},
        None,
    )?;

    Ok(stream)
}

#[inline]
fn write_output<T: cpal::SizedSample + cpal::FromSample<f32>>(
    data: &mut [T],
    channels: usize,
    rendered: &[f32],
) {
    for (i, sample) in data.iter_mut().enumerate() {
        let frame = i / channels;
        let ch = i % channels;
        let frame_count = rendered.len() / 2;
        let value = if ch < 2 && frame < frame_count {
            rendered[frame * 2 + ch]
        } else {
            0.0
        };
        *sample = T::from_sample(value);
    }
}

#[inline]
fn output_silence<T: cpal::SizedSample + cpal::FromSample<f32>>(data: &mut [T]) {
    for sample in data.iter_mut() {
        *sample = T::from_sample(0.0);
    }
}
