//! Hour/minute/second picker state

use serde::{Deserialize, Serialize};

/// Largest hour value the picker offers
pub const MAX_HOURS: u32 = 99;
/// Largest minute and second value the picker offers
pub const MAX_MINUTES_SECONDS: u32 = 59;

/// Duration selected for the next run. Independent of any active run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SelectedDuration {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl SelectedDuration {
    /// Create a selection, clamping each field to the picker's range
    pub fn new(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self {
            hours: hours.min(MAX_HOURS),
            minutes: minutes.min(MAX_MINUTES_SECONDS),
            seconds: seconds.min(MAX_MINUTES_SECONDS),
        }
    }

    pub fn total_ms(&self) -> u64 {
        let secs = u64::from(self.hours) * 3_600 + u64::from(self.minutes) * 60 + u64::from(self.seconds);
        secs * 1_000
    }

    /// Start is offered only for a non-empty selection
    pub fn can_start(&self) -> bool {
        self.hours + self.minutes + self.seconds > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_to_picker_range() {
        let selection = SelectedDuration::new(120, 75, 60);
        assert_eq!(selection, SelectedDuration::new(99, 59, 59));
    }

    #[test]
    fn total_in_milliseconds() {
        assert_eq!(SelectedDuration::new(1, 1, 1).total_ms(), 3_661_000);
        assert_eq!(SelectedDuration::new(0, 0, 5).total_ms(), 5_000);
    }

    #[test]
    fn start_enabled_only_for_non_empty_selection() {
        assert!(!SelectedDuration::default().can_start());
        assert!(SelectedDuration::new(0, 0, 1).can_start());
        assert!(SelectedDuration::new(0, 1, 0).can_start());
        assert!(SelectedDuration::new(1, 0, 0).can_start());
    }
}
