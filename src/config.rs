//! §6 "Configuration": the single options structure the engine consumes,
//! plus the four named presets.

use crate::error::{MonteCarloError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceCriteria {
    Fixed,
    MeanStability,
    VarianceStability,
    PercentileStability,
    Combined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub iterations: u64,
    pub min_iterations: u64,
    pub max_iterations: u64,
    pub random_seed: Option<u32>,
    pub convergence_criteria: ConvergenceCriteria,
    pub convergence_threshold: f64,
    pub convergence_check_interval: u64,
    pub max_execution_time: Option<std::time::Duration>,
    pub parallel_execution: bool,
    pub num_threads: Option<usize>,
    pub confidence_levels: Vec<f64>,
    pub percentiles: Vec<f64>,
    pub enable_caching: bool,
    pub cache_size_limit: u64,
    pub parameter_change_sensitivity: f64,
    pub enable_progress_tracking: bool,
    pub progress_callback_interval: u64,
    pub enable_convergence_monitoring: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            iterations: 10_000,
            min_iterations: 1_000,
            max_iterations: 1_000_000,
            random_seed: None,
            convergence_criteria: ConvergenceCriteria::Fixed,
            convergence_threshold: 0.95,
            convergence_check_interval: 1_000,
            max_execution_time: None,
            parallel_execution: false,
            num_threads: None,
            confidence_levels: vec![0.80, 0.90, 0.95],
            percentiles: vec![10.0, 25.0, 50.0, 75.0, 90.0, 95.0, 99.0],
            enable_caching: true,
            cache_size_limit: 100,
            parameter_change_sensitivity: 1e-6,
            enable_progress_tracking: true,
            progress_callback_interval: 1_000,
            enable_convergence_monitoring: true,
        }
    }
}

impl Configuration {
    pub fn validate(&self) -> Result<()> {
        if self.iterations < self.min_iterations {
            return Err(MonteCarloError::validation("iterations", "below min_iterations"));
        }
        if self.min_iterations < 1_000 {
            return Err(MonteCarloError::validation("min_iterations", "must be >= 1 000"));
        }
        if self.max_iterations > 1_000_000 || self.max_iterations < self.iterations {
            return Err(MonteCarloError::validation("max_iterations", "must be <= 1 000 000 and >= iterations"));
        }
        if !(0.5..=1.0).contains(&self.convergence_threshold) {
            return Err(MonteCarloError::validation("convergence_threshold", "must be in [0.5, 1.0]"));
        }
        if self.convergence_check_interval < 100 {
            return Err(MonteCarloError::validation("convergence_check_interval", "must be >= 100"));
        }
        if let Some(n) = self.num_threads {
            if !(1..=32).contains(&n) {
                return Err(MonteCarloError::validation("num_threads", "must be in [1, 32]"));
            }
        }
        for &c in &self.confidence_levels {
            if !(0.5..=0.99).contains(&c) {
                return Err(MonteCarloError::validation("confidence_levels", "each level must be in [0.5, 0.99]"));
            }
        }
        for &p in &self.percentiles {
            if !(1.0..=99.0).contains(&p) {
                return Err(MonteCarloError::validation("percentiles", "each percentile must be in [1, 99]"));
            }
        }
        if !(1e-10..=1e-3).contains(&self.parameter_change_sensitivity) {
            return Err(MonteCarloError::validation(
                "parameter_change_sensitivity",
                "must be in [1e-10, 1e-3]",
            ));
        }
        if self.progress_callback_interval < 100 {
            return Err(MonteCarloError::validation("progress_callback_interval", "must be >= 100"));
        }
        Ok(())
    }

    /// §6 preset: 10 000 iterations, fixed convergence — fast turnaround.
    pub fn fast() -> Self {
        Self { iterations: 10_000, convergence_criteria: ConvergenceCriteria::Fixed, ..Self::default() }
    }

    /// §6 preset: 50 000 iterations, combined convergence at 0.95.
    pub fn balanced() -> Self {
        Self {
            iterations: 50_000,
            convergence_criteria: ConvergenceCriteria::Combined,
            convergence_threshold: 0.95,
            ..Self::default()
        }
    }

    /// §6 preset: 100 000 iterations, combined convergence at 0.98.
    pub fn accurate() -> Self {
        Self {
            iterations: 100_000,
            convergence_criteria: ConvergenceCriteria::Combined,
            convergence_threshold: 0.98,
            ..Self::default()
        }
    }

    /// §6 preset: 5 000 iterations, caching off, lowered minimum — for
    /// iterating on a model locally.
    pub fn development() -> Self {
        Self {
            iterations: 5_000,
            min_iterations: 100,
            convergence_criteria: ConvergenceCriteria::Fixed,
            enable_caching: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Configuration::default().validate().unwrap();
    }

    #[test]
    fn fast_preset_validates() {
        Configuration::fast().validate().unwrap();
    }

    #[test]
    fn development_preset_validates_with_its_lowered_floor() {
        Configuration::development().validate().unwrap();
    }

    #[test]
    fn rejects_iterations_below_configured_floor() {
        let mut cfg = Configuration::default();
        cfg.iterations = 500;
        cfg.min_iterations = 1_000;
        assert!(cfg.validate().is_err());
    }
}
