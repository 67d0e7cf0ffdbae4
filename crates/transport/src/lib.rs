use std::sync::Arc;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

pub mod cancel;
pub mod clock;
pub mod events;
pub mod sink;

pub use cancel::{CancellationToken, DEFAULT_JOIN_TIMEOUT, WorkerHandle};
pub use clock::PositionClock;
pub use events::{PitchSample, PlayerEvent};
pub use sink::PlaybackSink;

/// Shared, immutable audio sample data.
///
/// `AudioArc` provides cheap cloning through reference counting while keeping
/// the sample data immutable and shareable. The samples live in an
/// `Arc<[f32]>`, so the analysis worker and the output sink can each hold the
/// same decoded buffer without copying it. A clone held by a worker keeps the
/// data alive even after the owning session has been replaced.
///
/// # Examples
///
/// ```
/// use pitchplay_transport::AudioArc;
///
/// let samples = vec![0.0, 0.5, 1.0, 0.5];
/// let audio = AudioArc::new(samples, 44100, 2);
///
/// // Clone is cheap - just bumps refcount
/// let audio2 = audio.clone();
/// assert_eq!(audio.frames(), 2);
/// assert_eq!(audio2.frames(), 2);
/// ```
#[derive(Clone)]
pub struct AudioArc {
    /// Raw interleaved samples stored in a reference-counted slice.
    samples: Arc<[f32]>,
    /// Sample rate in Hz (e.g., 44100, 48000)
    sample_rate: u32,
    /// Number of interleaved channels (e.g., 1 for mono, 2 for stereo)
    channels: u16,
}

impl AudioArc {
    /// Create a new `AudioArc` from owned sample data.
    ///
    /// `samples` are interleaved; for stereo the format is [L, R, L, R, ...].
    ///
    /// # Panics
    ///
    /// Panics if `channels` is 0 or if `samples.len()` is not divisible by
    /// `channels`.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        assert!(channels > 0, "channels must be greater than 0");
        assert_eq!(
            samples.len() % channels as usize,
            0,
            "samples.len() must be divisible by channels"
        );
        Self {
            samples: Arc::from(samples),
            sample_rate,
            channels,
        }
    }

    /// Get a slice of all interleaved samples.
    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Get a reference to the inner `Arc<[f32]>`, e.g. for refcount checks.
    pub fn samples_arc(&self) -> &Arc<[f32]> {
        &self.samples
    }

    /// Get the sample rate in Hz.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the number of channels.
    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Get the number of frames (samples per channel).
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Get the total number of samples (frames * channels).
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the audio buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get the duration in whole milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frames() as u64 * 1000 / self.sample_rate as u64
    }

    /// Resample this audio to a target sample rate.
    ///
    /// If the audio is already at the target rate, returns a clone (cheap
    /// refcount bump). Otherwise performs sinc interpolation resampling.
    ///
    /// # Errors
    ///
    /// Returns an error if resampling fails (e.g., invalid parameters).
    pub fn resample(&self, target_sample_rate: u32) -> anyhow::Result<Self> {
        if self.sample_rate == target_sample_rate {
            return Ok(self.clone());
        }

        let channels = self.channels as usize;
        let input_frames = self.frames();
        let resample_ratio = target_sample_rate as f64 / self.sample_rate as f64;

        // Convert interleaved samples to per-channel format for rubato
        let mut input_channels = vec![Vec::with_capacity(input_frames); channels];
        for frame_idx in 0..input_frames {
            for ch in 0..channels {
                input_channels[ch].push(self.samples[frame_idx * channels + ch]);
            }
        }

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let mut resampler =
            SincFixedIn::<f32>::new(resample_ratio, 2.0, params, input_frames, channels)?;

        let output_channels = resampler.process(&input_channels, None)?;

        // Convert back to interleaved format
        let output_frames = output_channels[0].len();
        let mut output_samples = Vec::with_capacity(output_frames * channels);
        for frame_idx in 0..output_frames {
            for ch in 0..channels {
                output_samples.push(output_channels[ch][frame_idx]);
            }
        }

        Ok(AudioArc::new(
            output_samples,
            target_sample_rate,
            self.channels,
        ))
    }
}

impl std::fmt::Debug for AudioArc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioArc")
            .field("frames", &self.frames())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration_ms", &self.duration_ms())
            .finish()
    }
}
