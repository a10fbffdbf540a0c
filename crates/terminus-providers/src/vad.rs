//! Voice activity detection.

use terminus_core::AudioFrame;

/// Result of voice activity detection on an audio frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadResult {
    /// Speech was detected in the audio frame.
    Speech,
    /// The audio frame contains only silence or background noise.
    Silence,
    /// The detector could not determine the content (e.g., empty frame).
    Unknown,
}

/// Classifies short audio frames as speech or silence.
pub trait VoiceActivityDetector: Send + Sync {
    fn detect(&self, frame: &AudioFrame) -> VadResult;
}

/// Root-mean-square energy threshold detector.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    threshold: f32,
}

impl EnergyVad {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.max(0.0),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn detect(&self, frame: &AudioFrame) -> VadResult {
        if frame.samples.is_empty() {
            return VadResult::Unknown;
        }
        let sum_sq: f32 = frame.samples.iter().map(|s| s * s).sum();
        let rms = (sum_sq / frame.samples.len() as f32).sqrt();
        if rms > self.threshold {
            VadResult::Speech
        } else {
            VadResult::Silence
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_frame_is_unknown() {
        let vad = EnergyVad::default();
        assert_eq!(vad.detect(&AudioFrame::new(vec![], 16000)), VadResult::Unknown);
    }

    #[test]
    fn test_silence_below_threshold() {
        let vad = EnergyVad::new(0.01);
        let frame = AudioFrame::new(vec![0.001; 320], 16000);
        assert_eq!(vad.detect(&frame), VadResult::Silence);
    }

    #[test]
    fn test_speech_above_threshold() {
        let vad = EnergyVad::new(0.01);
        let samples: Vec<f32> = (0..320)
            .map(|i| if i % 2 == 0 { 0.3 } else { -0.3 })
            .collect();
        assert_eq!(vad.detect(&AudioFrame::new(samples, 16000)), VadResult::Speech);
    }

    #[test]
    fn test_negative_threshold_clamped() {
        assert_eq!(EnergyVad::new(-1.0).threshold(), 0.0);
    }
}
