use super::model::{ClassifiedSample, OperatingState};

/// Count LOAD -> NO_LOAD edges between adjacent samples.
///
/// Transitions through OFF and NO_LOAD -> LOAD are not cycles, so a
/// LOAD -> OFF -> LOAD sequence counts zero.
pub fn count_cycles(classified: &[ClassifiedSample]) -> u64 {
    classified
        .windows(2)
        .filter(|pair| {
            pair[0].state == OperatingState::Load && pair[1].state == OperatingState::NoLoad
        })
        .count() as u64
}

/// Number of state changes of any kind, used for the stability indices.
pub fn count_transitions(classified: &[ClassifiedSample]) -> u64 {
    classified
        .windows(2)
        .filter(|pair| pair[0].state != pair[1].state)
        .count() as u64
}

/// Cycles per running hour; 0 when the compressor never ran.
pub fn cycles_per_hour(cycles: u64, hours_worked: f64) -> f64 {
    if hours_worked > 0.0 {
        cycles as f64 / hours_worked
    } else {
        0.0
    }
}
