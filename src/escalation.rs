//! Component G — time-based compounded cost escalation (§4.G).

use crate::distributions::Distribution;
use crate::error::{MonteCarloError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationType {
    Inflation,
    Currency,
    Material,
    Labor,
    Fuel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompoundingFrequency {
    Monthly,
    Quarterly,
    Annually,
}

impl CompoundingFrequency {
    fn periods_per_year(&self) -> f64 {
        match self {
            CompoundingFrequency::Monthly => 12.0,
            CompoundingFrequency::Quarterly => 4.0,
            CompoundingFrequency::Annually => 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationFactor {
    pub escalation_type: EscalationType,
    pub annual_rate: f64,
    pub rate_distribution: Option<Distribution>,
    pub compounding: CompoundingFrequency,
    pub category_weights: Option<HashMap<String, f64>>,
}

impl EscalationFactor {
    pub fn new(escalation_type: EscalationType, annual_rate: f64, compounding: CompoundingFrequency) -> Self {
        Self { escalation_type, annual_rate, rate_distribution: None, compounding, category_weights: None }
    }

    pub fn with_distribution(mut self, dist: Distribution) -> Self {
        self.rate_distribution = Some(dist);
        self
    }

    pub fn with_category_weights(mut self, weights: HashMap<String, f64>) -> Self {
        self.category_weights = Some(weights);
        self
    }

    /// §4.G defaults for the five named factor types, used to fill in any
    /// type not present in a caller-supplied custom set.
    pub fn default_inflation() -> Self {
        EscalationFactor::new(EscalationType::Inflation, 0.025, CompoundingFrequency::Annually)
            .with_distribution(
                Distribution::normal(0.025, 0.01).unwrap().with_bounds(crate::distributions::Bounds::new(Some(0.0), Some(0.10))),
            )
    }

    pub fn default_currency() -> Self {
        EscalationFactor::new(EscalationType::Currency, 0.0, CompoundingFrequency::Annually).with_distribution(
            Distribution::normal(0.0, 0.05).unwrap().with_bounds(crate::distributions::Bounds::new(Some(-0.20), Some(0.20))),
        )
    }

    pub fn default_material() -> Self {
        EscalationFactor::new(EscalationType::Material, 0.035, CompoundingFrequency::Annually)
            .with_distribution(Distribution::triangular(0.01, 0.035, 0.08).unwrap())
    }

    pub fn default_labor() -> Self {
        EscalationFactor::new(EscalationType::Labor, 0.03, CompoundingFrequency::Annually)
            .with_distribution(Distribution::triangular(0.015, 0.03, 0.06).unwrap())
    }

    /// Warn per §4.G validation rules; does not fail construction.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.annual_rate.abs() > 0.5 {
            out.push(format!("{:?} annual_rate {} exceeds +-50%", self.escalation_type, self.annual_rate));
        }
        if let Some(weights) = &self.category_weights {
            let sum: f64 = weights.values().sum();
            if sum > 1.1 {
                out.push(format!("{:?} category weights sum to {sum}, above 1.1", self.escalation_type));
            }
            for (k, &w) in weights {
                if !(0.0..=1.0).contains(&w) {
                    out.push(format!("{:?} category weight for '{k}' = {w} outside [0, 1]", self.escalation_type));
                }
            }
        }
        out
    }

    fn sample_rate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<(f64, Option<String>)> {
        match &self.rate_distribution {
            Some(dist) => {
                let r = dist.sample_one(rng)?;
                if !r.is_finite() || !(-1.0..=2.0).contains(&r) {
                    return Ok((
                        self.annual_rate,
                        Some(format!(
                            "{:?} escalation rate sample {r} outside [-1, 2] or non-finite, falling back to annual_rate",
                            self.escalation_type
                        )),
                    ));
                }
                Ok((r, None))
            }
            None => Ok((self.annual_rate, None)),
        }
    }
}

/// The active factor set: custom factors union defaults not overridden
/// and not explicitly removed (§4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationModel {
    pub factors: Vec<EscalationFactor>,
}

impl EscalationModel {
    pub fn with_defaults(custom: Vec<EscalationFactor>) -> Self {
        let mut present: std::collections::HashSet<EscalationType> =
            custom.iter().map(|f| f.escalation_type).collect();
        let mut factors = custom;
        let defaults = [
            (EscalationType::Inflation, EscalationFactor::default_inflation as fn() -> EscalationFactor),
            (EscalationType::Currency, EscalationFactor::default_currency),
            (EscalationType::Material, EscalationFactor::default_material),
            (EscalationType::Labor, EscalationFactor::default_labor),
        ];
        for (kind, make) in defaults {
            if present.insert(kind) {
                factors.push(make());
            }
        }
        Self { factors }
    }

    pub fn warnings(&self) -> Vec<String> {
        self.factors.iter().flat_map(|f| f.warnings()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationResult {
    pub base_cost: f64,
    pub escalated_cost: f64,
    pub escalation_amount: f64,
    pub per_factor: HashMap<String, f64>,
    pub warnings: Vec<String>,
}

/// `(1 + r/f)^(d*f) - 1`, or the linear limit when `|r/f|` is negligible.
pub fn compounded_multiplier(annual_rate: f64, frequency: CompoundingFrequency, years: f64) -> f64 {
    let f = frequency.periods_per_year();
    let per_period = annual_rate / f;
    if per_period.abs() < 1e-10 {
        annual_rate * years
    } else {
        (1.0 + per_period).powf(years * f) - 1.0
    }
}

/// §4.G "Compounded escalation": apply the active factor set to `base_cost`
/// over a `years`-long span, with an optional category-weighted breakdown.
pub fn apply_escalation<R: Rng + ?Sized>(
    model: &EscalationModel,
    base_cost: f64,
    category_breakdown: Option<&HashMap<String, f64>>,
    years: f64,
    rng: &mut R,
) -> Result<EscalationResult> {
    if !(base_cost.is_finite() && years.is_finite()) {
        return Err(MonteCarloError::validation("escalation inputs", "base_cost and years must be finite"));
    }
    let mut per_factor = HashMap::new();
    let mut warnings = model.warnings();
    let mut total_escalated = 0.0;
    let mut total_weighted_base = 0.0;

    for factor in &model.factors {
        let (rate, warn) = factor.sample_rate(rng)?;
        if let Some(w) = warn {
            warnings.push(w);
        }
        let multiplier = compounded_multiplier(rate, factor.compounding, years);

        let applicable_base = match (&factor.category_weights, category_breakdown) {
            (Some(weights), Some(breakdown)) => weights
                .iter()
                .map(|(cat, &w)| breakdown.get(cat).copied().unwrap_or(0.0) * w)
                .sum::<f64>(),
            _ => base_cost,
        };

        let escalated = applicable_base * multiplier;
        per_factor.insert(format!("{:?}", factor.escalation_type).to_lowercase(), escalated);
        total_escalated += escalated;
        total_weighted_base += applicable_base;
    }

    let _ = total_weighted_base;
    let escalated_cost = base_cost + total_escalated;
    Ok(EscalationResult {
        base_cost,
        escalated_cost,
        escalation_amount: total_escalated,
        per_factor,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn zero_rate_is_a_no_op() {
        let model = EscalationModel { factors: vec![EscalationFactor::new(
            EscalationType::Inflation,
            0.0,
            CompoundingFrequency::Annually,
        )] };
        let mut rng = StdRng::seed_from_u64(1);
        let result = apply_escalation(&model, 100_000.0, None, 1.0, &mut rng).unwrap();
        assert!((result.escalated_cost - 100_000.0).abs() < 1e-9);
    }

    #[test]
    fn positive_rate_increases_cost_negative_decreases_it() {
        let mut rng = StdRng::seed_from_u64(1);
        let up = EscalationModel { factors: vec![EscalationFactor::new(EscalationType::Inflation, 0.05, CompoundingFrequency::Annually)] };
        let down = EscalationModel { factors: vec![EscalationFactor::new(EscalationType::Inflation, -0.05, CompoundingFrequency::Annually)] };
        let r_up = apply_escalation(&up, 100_000.0, None, 1.0, &mut rng).unwrap();
        let r_down = apply_escalation(&down, 100_000.0, None, 1.0, &mut rng).unwrap();
        assert!(r_up.escalated_cost >= 100_000.0);
        assert!(r_down.escalated_cost <= 100_000.0);
    }

    #[test]
    fn e5_single_year_five_percent_no_distribution() {
        let model = EscalationModel { factors: vec![EscalationFactor::new(EscalationType::Inflation, 0.05, CompoundingFrequency::Annually)] };
        let mut rng = StdRng::seed_from_u64(1);
        let result = apply_escalation(&model, 100_000.0, None, 1.0, &mut rng).unwrap();
        assert!((result.escalated_cost - 105_000.0).abs() < 1e-6);
    }

    #[test]
    fn doubling_time_span_scales_escalation_within_expected_band() {
        let mult_1y = compounded_multiplier(0.05, CompoundingFrequency::Annually, 1.0);
        let mult_2y = compounded_multiplier(0.05, CompoundingFrequency::Annually, 2.0);
        let ratio = mult_2y / mult_1y;
        assert!(ratio >= 0.8 * 2.0 && ratio <= 1.3 * 2.0, "ratio {ratio}");
    }
}
