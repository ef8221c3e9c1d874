//! Time allocation for clock-driven searches.

/// Tunables for the allocation heuristic, adjustable over UCI.
#[derive(Debug, Clone, Copy)]
pub struct TimeConfig {
    /// Fraction of the remaining clock to invest each move.
    pub base_fraction: f64,
    /// Additional fraction of the increment to invest.
    pub increment_fraction: f64,
    pub min_time_ms: i64,
    pub max_time_ms: i64,
}

impl Default for TimeConfig {
    fn default() -> TimeConfig {
        TimeConfig {
            base_fraction: 0.04,
            increment_fraction: 0.5,
            min_time_ms: 10,
            max_time_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimeManager {
    config: TimeConfig,
}

impl TimeManager {
    pub fn new(config: TimeConfig) -> TimeManager {
        TimeManager { config }
    }

    /// Milliseconds to spend on the current move. Openings get a boost,
    /// long endgames taper off, and the allocation never exceeds an even
    /// split of the remaining clock over the moves still to play.
    pub fn allocate_ms(
        &self,
        remaining_ms: i64,
        increment_ms: i64,
        move_number: u32,
        moves_to_go: i32,
    ) -> i64 {
        let phase_boost = if move_number < 20 {
            1.2
        } else if move_number > 60 {
            0.8
        } else {
            1.0
        };

        let base = remaining_ms as f64 * self.config.base_fraction * phase_boost
            + increment_ms as f64 * self.config.increment_fraction;

        let horizon = moves_to_go.max(30) as f64;
        let cap = remaining_ms as f64 / horizon;

        (base.min(cap) as i64).clamp(self.config.min_time_ms, self.config.max_time_ms)
    }
}
