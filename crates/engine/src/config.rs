use std::ops::RangeInclusive;

use crate::pathfinder::DEFAULT_MAX_EXPANSIONS;

pub const DEFAULT_TICKS_PER_SECOND: u32 = 60;
pub const STUCK_WINDOW_SECONDS: f32 = 2.0;
pub const SWING_COOLDOWN_SECONDS: f32 = 0.5;
pub const HOLD_MIN_SECONDS: f32 = 0.5;
pub const HOLD_MAX_SECONDS: f32 = 3.0;
pub const MAX_REPLAN_ATTEMPTS: u32 = 5;
pub const MAX_REPEAT_SWINGS: u32 = 100;
pub const TOOLBAR_SLOTS: u8 = 12;

/// Tick-denominated limits for the scheduler.
///
/// The time-based values only mean what they say when the driver keeps a stable tick rate;
/// the scheduler itself counts ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub ticks_per_second: u32,
    pub stuck_threshold_ticks: u32,
    pub max_replan_attempts: u32,
    pub swing_cooldown_ticks: u32,
    pub repeat_swings: RangeInclusive<u32>,
    pub hold_ticks: RangeInclusive<u32>,
    pub max_path_expansions: usize,
    pub toolbar_slots: u8,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::for_tick_rate(DEFAULT_TICKS_PER_SECOND)
    }
}

impl SchedulerConfig {
    pub fn for_tick_rate(ticks_per_second: u32) -> Self {
        let ticks_per_second = ticks_per_second.max(1);
        let hold_min = seconds_to_ticks(HOLD_MIN_SECONDS, ticks_per_second);
        let hold_max = seconds_to_ticks(HOLD_MAX_SECONDS, ticks_per_second).max(hold_min);
        Self {
            ticks_per_second,
            stuck_threshold_ticks: seconds_to_ticks(STUCK_WINDOW_SECONDS, ticks_per_second),
            max_replan_attempts: MAX_REPLAN_ATTEMPTS,
            swing_cooldown_ticks: seconds_to_ticks(SWING_COOLDOWN_SECONDS, ticks_per_second),
            repeat_swings: 1..=MAX_REPEAT_SWINGS,
            hold_ticks: hold_min..=hold_max,
            max_path_expansions: DEFAULT_MAX_EXPANSIONS,
            toolbar_slots: TOOLBAR_SLOTS,
        }
    }

    pub fn clamp_swings(&self, requested: u32) -> u32 {
        requested.clamp(*self.repeat_swings.start(), *self.repeat_swings.end())
    }

    pub fn clamp_hold_ticks(&self, requested: u32) -> u32 {
        requested.clamp(*self.hold_ticks.start(), *self.hold_ticks.end())
    }
}

fn seconds_to_ticks(seconds: f32, ticks_per_second: u32) -> u32 {
    ((seconds * ticks_per_second as f32).round() as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_converts_seconds_at_sixty_tps() {
        let config = SchedulerConfig::default();
        assert_eq!(config.stuck_threshold_ticks, 120);
        assert_eq!(config.swing_cooldown_ticks, 30);
        assert_eq!(config.hold_ticks, 30..=180);
        assert_eq!(config.max_replan_attempts, 5);
    }

    #[test]
    fn clamps_follow_configured_ranges() {
        let config = SchedulerConfig::default();
        assert_eq!(config.clamp_swings(0), 1);
        assert_eq!(config.clamp_swings(250), 100);
        assert_eq!(config.clamp_swings(7), 7);
        assert_eq!(config.clamp_hold_ticks(1), 30);
        assert_eq!(config.clamp_hold_ticks(1_000), 180);
        assert_eq!(config.clamp_hold_ticks(60), 60);
    }

    #[test]
    fn zero_tick_rate_is_normalized() {
        let config = SchedulerConfig::for_tick_rate(0);
        assert_eq!(config.ticks_per_second, 1);
        assert!(config.swing_cooldown_ticks >= 1);
        assert!(config.hold_ticks.start() <= config.hold_ticks.end());
    }
}
