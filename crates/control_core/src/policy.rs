//! Throttle and mode policy: turns gaze samples into scroll commands.
//!
//! The policy only decides. The caller owns the last-scroll timestamp and updates it when a
//! command is acted upon.

use std::time::{Duration, Instant};

use shared::domain::{GazeSample, ScrollCommand, ScrollMode, ScrollSettings};

pub const CONTINUOUS_INTERVAL: Duration = Duration::from_millis(100);
pub const SKIP_INTERVAL: Duration = Duration::from_millis(1000);
pub const MIN_SCROLL_INTERVAL: Duration = Duration::from_millis(100);
pub const CONTINUOUS_DISTANCE_FRACTION: f32 = 0.08;
/// Short stroke so each command reads as a jump rather than a drag.
pub const SCROLL_DURATION_MS: u32 = 50;

pub fn scroll_interval(mode: ScrollMode) -> Duration {
    match mode {
        ScrollMode::Continuous => CONTINUOUS_INTERVAL,
        ScrollMode::Skip => SKIP_INTERVAL,
        ScrollMode::Delayed(seconds) => {
            Duration::from_secs(u64::from(seconds)).max(MIN_SCROLL_INTERVAL)
        }
    }
}

pub fn distance_fraction(settings: &ScrollSettings) -> f32 {
    match settings.mode {
        ScrollMode::Continuous => CONTINUOUS_DISTANCE_FRACTION,
        ScrollMode::Skip | ScrollMode::Delayed(_) => settings.skip_distance,
    }
}

pub fn is_throttled(mode: ScrollMode, last_scroll: Option<Instant>, now: Instant) -> bool {
    last_scroll.is_some_and(|last| now.saturating_duration_since(last) < scroll_interval(mode))
}

pub fn decide(
    sample: &GazeSample,
    settings: &ScrollSettings,
    last_scroll: Option<Instant>,
    now: Instant,
) -> Option<ScrollCommand> {
    let direction = sample.direction.scroll_direction()?;
    if is_throttled(settings.mode, last_scroll, now) {
        return None;
    }

    Some(ScrollCommand {
        direction,
        distance_fraction: distance_fraction(settings),
        duration_ms: SCROLL_DURATION_MS,
    })
}

#[cfg(test)]
#[path = "tests/policy_tests.rs"]
mod tests;
