//! Random placement of food and debuffs on a board

use log::warn;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Coord, Grid};
use std::collections::HashSet;

/// Uniform rejection sampler over the grid
///
/// Seeded instances produce reproducible spawn sequences, which the test
/// suites rely on to replay a match tick for tick.
#[derive(Debug)]
pub struct PositionOracle {
    rng: StdRng,
}

impl PositionOracle {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Samples a cell outside `forbidden`
    ///
    /// Makes one attempt per grid cell. A saturated grid degrades to (0, 0)
    /// so the simulation keeps running with a possibly overlapping spawn.
    pub fn sample(&mut self, grid: &Grid, forbidden: &HashSet<Coord>) -> Coord {
        if grid.size > 0 {
            for _ in 0..grid.area() {
                let candidate = Coord::new(
                    self.rng.gen_range(0..grid.size),
                    self.rng.gen_range(0..grid.size),
                );
                if !forbidden.contains(&candidate) {
                    return candidate;
                }
            }
        }

        warn!(
            "No free cell found after {} attempts ({} forbidden), falling back to (0, 0)",
            grid.area(),
            forbidden.len()
        );
        Coord::new(0, 0)
    }
}

impl Default for PositionOracle {
    fn default() -> Self {
        Self::from_entropy()
    }
}
