use rustfft::{FftPlanner, num_complex::Complex};
use thiserror::Error;

/// Lower edge of the reported pitch band, exclusive.
pub const PITCH_MIN_HZ: f32 = 50.0;
/// Upper edge of the reported pitch band, exclusive.
pub const PITCH_MAX_HZ: f32 = 800.0;

/// FFT frame length in samples.
pub const FRAME_SIZE: usize = 4096;
/// Samples between successive frames within one analysis window.
pub const HOP_SIZE: usize = 2048;

/// Peak magnitudes below this are treated as an unvoiced frame.
const SILENCE_FLOOR: f32 = 1e-6;

/// Transient failure analyzing a single window. The scheduler skips that
/// window's publish and keeps looping.
#[derive(Debug, Clone, Copy, Error)]
pub enum EstimationError {
    #[error("empty analysis window")]
    EmptyWindow,
    #[error("sample rate must be nonzero")]
    InvalidSampleRate,
}

/// Estimate the fundamental frequency sounding in `window`.
///
/// The window is split into `FRAME_SIZE` frames advancing by `HOP_SIZE` (a
/// short window becomes a single zero-padded frame). Each frame is Hann
/// windowed and transformed; the frequency of its largest-magnitude bin is
/// kept when it falls strictly inside (`PITCH_MIN_HZ`, `PITCH_MAX_HZ`). The
/// estimate is the arithmetic mean of the surviving per-frame frequencies,
/// or None when no frame was voiced in that band.
///
/// The filter range and the averaging policy decide what a visualization
/// shows for silence versus voiced content; both are load-bearing.
pub fn estimate_pitch(window: &[f32], sample_rate: u32) -> Result<Option<f32>, EstimationError> {
    if sample_rate == 0 {
        return Err(EstimationError::InvalidSampleRate);
    }
    if window.is_empty() {
        return Err(EstimationError::EmptyWindow);
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FRAME_SIZE);
    let bin_hz = sample_rate as f32 / FRAME_SIZE as f32;

    let hann: Vec<f32> = (0..FRAME_SIZE)
        .map(|n| {
            let phase = 2.0 * std::f32::consts::PI * n as f32 / (FRAME_SIZE - 1) as f32;
            0.5 - 0.5 * phase.cos()
        })
        .collect();

    let mut frame = vec![Complex::new(0.0f32, 0.0f32); FRAME_SIZE];
    let mut voiced: Vec<f32> = Vec::new();

    let mut start = 0;
    while start < window.len() {
        let chunk = &window[start..window.len().min(start + FRAME_SIZE)];
        for (i, slot) in frame.iter_mut().enumerate() {
            let sample = chunk.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * hann[i], 0.0);
        }
        fft.process(&mut frame);

        // Largest-magnitude candidate bin, DC excluded.
        let mut peak_bin = 0;
        let mut peak_mag_sq = 0.0f32;
        for (bin, value) in frame.iter().enumerate().take(FRAME_SIZE / 2).skip(1) {
            let mag_sq = value.norm_sqr();
            if mag_sq > peak_mag_sq {
                peak_mag_sq = mag_sq;
                peak_bin = bin;
            }
        }

        if peak_bin != 0 && peak_mag_sq.sqrt() >= SILENCE_FLOOR {
            let frequency = peak_bin as f32 * bin_hz;
            if frequency > PITCH_MIN_HZ && frequency < PITCH_MAX_HZ {
                voiced.push(frequency);
            }
        }

        start += HOP_SIZE;
    }

    if voiced.is_empty() {
        Ok(None)
    } else {
        Ok(Some(voiced.iter().sum::<f32>() / voiced.len() as f32))
    }
}
