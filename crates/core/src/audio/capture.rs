//! Microphone capture through `cpal`.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::{CaptureStream, Result, VisualizerError};

/// Keeps the input stream alive. Dropping it stops capture; the
/// [`CaptureStream`] handle stays valid but receives no more samples.
pub struct MicrophoneCapture {
    stream: CaptureStream,
    sample_rate: u32,
    _input: cpal::Stream,
}

impl MicrophoneCapture {
    /// Opens the default input device and starts pushing mono samples into a
    /// fresh [`CaptureStream`].
    pub fn open_default(capacity: usize) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| VisualizerError::connection("no audio input device found"))?;
        let config = device
            .default_input_config()
            .map_err(|err| VisualizerError::connection(err.to_string()))?;

        if config.sample_format() != cpal::SampleFormat::F32 {
            return Err(VisualizerError::connection(format!(
                "unsupported input sample format {:?}",
                config.sample_format()
            )));
        }

        let channels = usize::from(config.channels()).max(1);
        let sample_rate = config.sample_rate().0;
        let stream = CaptureStream::new(capacity);
        let sink = stream.clone();
        let mut mono = Vec::with_capacity(1024);

        let input = device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    mono.clear();
                    mono.extend(
                        data.chunks(channels)
                            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
                    );
                    if let Err(err) = sink.push_samples(&mono) {
                        tracing::warn!(%err, "dropping captured block");
                    }
                },
                |err| tracing::warn!(%err, "input stream error"),
                None,
            )
            .map_err(|err| VisualizerError::connection(err.to_string()))?;
        input
            .play()
            .map_err(|err| VisualizerError::connection(err.to_string()))?;

        tracing::info!(
            device = %device.name().unwrap_or_default(),
            sample_rate,
            channels,
            "microphone capture started"
        );

        Ok(Self {
            stream,
            sample_rate,
            _input: input,
        })
    }

    pub fn stream(&self) -> &CaptureStream {
        &self.stream
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
