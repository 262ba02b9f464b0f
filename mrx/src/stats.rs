//! Running content-package size statistics

use serde::{Deserialize, Serialize};

/// Finalized statistics as they appear in the layout document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statistics {
    pub mean: f64,
    pub variance: f64,
    pub standard_deviation: f64,
    pub count: u64,
    pub minimum: u64,
    pub maximum: u64,
}

/// Welford accumulator over content-package byte lengths.
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    mean: f64,
    m2: f64,
    count: u64,
    min: u64,
    max: u64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one package length.
    pub fn push(&mut self, x: u64) {
        if self.count == 0 {
            self.min = x;
            self.max = x;
        } else {
            self.min = self.min.min(x);
            self.max = self.max.max(x);
        }
        self.count += 1;

        let x = x as f64;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Population statistics. With two samples or fewer everything but
    /// the count is reported as zero.
    pub fn finalize(&self) -> Statistics {
        if self.count <= 2 {
            return Statistics {
                count: self.count,
                ..Statistics::default()
            };
        }

        let variance = self.m2 / self.count as f64;
        Statistics {
            mean: self.mean,
            variance,
            standard_deviation: variance.sqrt(),
            count: self.count,
            minimum: self.min,
            maximum: self.max,
        }
    }
}
