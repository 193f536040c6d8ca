//! Match tuning knobs

use crate::oracle::PositionOracle;
use shared::{Grid, COUNTDOWN_FROM, COUNTDOWN_INTERVAL_MS, GRID_SIZE, TICK_RATE_MS};
use std::time::Duration;

/// Settings for the single match hosted by a server
#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    pub grid: Grid,
    /// Period of the movement tick while running
    pub tick_duration: Duration,
    /// Delay between countdown announcements
    pub countdown_interval: Duration,
    /// First number announced by the countdown
    pub countdown_from: u8,
    /// Fixed RNG seed for reproducible spawns
    pub seed: Option<u64>,
}

impl MatchConfig {
    pub fn tick_rate_hz(&self) -> f32 {
        1.0 / self.tick_duration.as_secs_f32()
    }

    pub fn oracle(&self) -> PositionOracle {
        match self.seed {
            Some(seed) => PositionOracle::seeded(seed),
            None => PositionOracle::from_entropy(),
        }
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            grid: Grid::new(GRID_SIZE),
            tick_duration: Duration::from_millis(TICK_RATE_MS),
            countdown_interval: Duration::from_millis(COUNTDOWN_INTERVAL_MS),
            countdown_from: COUNTDOWN_FROM,
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::collections::HashSet;

    #[test]
    fn test_default_config() {
        let config = MatchConfig::default();
        assert_eq!(config.grid.size, 20);
        assert_eq!(config.tick_duration, Duration::from_millis(150));
        assert_eq!(config.countdown_interval, Duration::from_secs(1));
        assert_eq!(config.countdown_from, 3);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_tick_rate_hz() {
        let mut config = MatchConfig::default();
        assert_approx_eq!(config.tick_rate_hz(), 6.6667, 0.001);

        config.tick_duration = Duration::from_millis(50);
        assert_approx_eq!(config.tick_rate_hz(), 20.0, 0.001);
    }

    #[test]
    fn test_seeded_config_builds_reproducible_oracle() {
        let config = MatchConfig {
            seed: Some(5),
            ..MatchConfig::default()
        };
        let forbidden = HashSet::new();

        let mut first = config.oracle();
        let mut second = config.oracle();
        assert_eq!(
            first.sample(&config.grid, &forbidden),
            second.sample(&config.grid, &forbidden)
        );
    }
}
