use super::model::{ClassifiedSample, CompressorProfile, OperatingState, Sample};
use crate::error::Result;

/// Threshold + hysteresis classifier for one compressor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateClassifier {
    load_threshold: f64,
    noload_threshold: f64,
    hysteresis: f64,
}

impl StateClassifier {
    /// Fails with a configuration error when the profile thresholds are
    /// inconsistent.
    pub fn new(profile: &CompressorProfile) -> Result<Self> {
        profile.validate()?;
        Ok(Self {
            load_threshold: profile.load_threshold_amp,
            noload_threshold: profile.noload_threshold_amp,
            hysteresis: profile.hysteresis_band_amp,
        })
    }

    /// Classify one reading given the state assigned to the previous one.
    ///
    /// Without a previous state the plain thresholds apply. With one, the
    /// band works on both boundaries: a running compressor must drop a full
    /// band below the no-load threshold to count as OFF (an OFF one stays OFF
    /// until it reaches the no-load threshold), and a compressor in LOAD stays
    /// there until it falls a band below the load threshold.
    pub fn classify_one(&self, current: f64, previous: Option<OperatingState>) -> OperatingState {
        if current >= self.load_threshold {
            return OperatingState::Load;
        }

        match previous {
            None => {
                if current < self.noload_threshold {
                    OperatingState::Off
                } else {
                    OperatingState::NoLoad
                }
            }
            Some(prev) => {
                if current < self.noload_threshold - self.hysteresis
                    || (prev == OperatingState::Off && current < self.noload_threshold)
                {
                    OperatingState::Off
                } else if prev == OperatingState::Load
                    && current >= self.load_threshold - self.hysteresis
                {
                    OperatingState::Load
                } else {
                    OperatingState::NoLoad
                }
            }
        }
    }

    /// Classify a time-ordered window. Every sample gets exactly one state.
    pub fn classify(&self, samples: &[Sample]) -> Vec<ClassifiedSample> {
        let mut previous = None;
        samples
            .iter()
            .map(|sample| {
                let state = self.classify_one(sample.current, previous);
                previous = Some(state);
                ClassifiedSample {
                    time: sample.time,
                    state,
                }
            })
            .collect()
    }
}
