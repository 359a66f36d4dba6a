//! Component H — budget/schedule compliance probabilities and tail-risk
//! metrics (§4.H).

use crate::mathutil;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceTier {
    VeryHigh,
    High,
    Medium,
    Low,
}

fn tier_for(probability: f64) -> ComplianceTier {
    if probability >= 0.95 {
        ComplianceTier::VeryHigh
    } else if probability >= 0.90 {
        ComplianceTier::High
    } else if probability >= 0.70 {
        ComplianceTier::Medium
    } else {
        ComplianceTier::Low
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub target: f64,
    pub compliance_probability: f64,
    pub tier: ComplianceTier,
    pub at_risk: f64,
    pub percentiles: std::collections::BTreeMap<u32, f64>,
    pub confidence_intervals: std::collections::BTreeMap<u32, (f64, f64)>,
}

/// §4.H "Budget compliance": probability of staying within `target`, the
/// cost-at-risk above it, and the compliance tier.
pub fn budget_compliance(outcomes: &[f64], target: f64, percentiles: &[f64], confidence_levels: &[f64]) -> ComplianceReport {
    let n = outcomes.len() as f64;
    let within = outcomes.iter().filter(|&&x| x <= target).count() as f64;
    let probability = if n > 0.0 { within / n } else { 0.0 };

    let over: Vec<f64> = outcomes.iter().filter(|&&x| x > target).map(|&x| x - target).collect();
    let at_risk = if over.is_empty() { 0.0 } else { mathutil::mean(&over) };

    let mut sorted = outcomes.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let mut pct_map = std::collections::BTreeMap::new();
    for &p in percentiles {
        pct_map.insert(p as u32, mathutil::percentile(&sorted, p));
    }

    let mut ci_map = std::collections::BTreeMap::new();
    for &c in confidence_levels {
        let alpha = 1.0 - c;
        let lo = mathutil::percentile(&sorted, alpha / 2.0 * 100.0);
        let hi = mathutil::percentile(&sorted, (1.0 - alpha / 2.0) * 100.0);
        ci_map.insert((c * 100.0).round() as u32, (lo, hi));
    }

    ComplianceReport {
        target,
        compliance_probability: probability,
        tier: tier_for(probability),
        at_risk,
        percentiles: pct_map,
        confidence_intervals: ci_map,
    }
}

/// §4.H "Schedule compliance": same pattern over a duration array, plus
/// optional per-milestone completion probabilities.
pub fn schedule_compliance(
    duration_outcomes: &[f64],
    target_duration: f64,
    percentiles: &[f64],
    confidence_levels: &[f64],
    milestone_offsets: &[(String, f64)],
) -> (ComplianceReport, std::collections::HashMap<String, f64>) {
    let report = budget_compliance(duration_outcomes, target_duration, percentiles, confidence_levels);
    let n = duration_outcomes.len() as f64;
    let mut per_milestone = std::collections::HashMap::new();
    for (id, offset) in milestone_offsets {
        let hit = duration_outcomes.iter().filter(|&&d| d <= *offset).count() as f64;
        per_milestone.insert(id.clone(), if n > 0.0 { hit / n } else { 0.0 });
    }
    (report, per_milestone)
}

/// Value at Risk: the `c`-quantile of the outcome distribution.
pub fn value_at_risk(outcomes: &[f64], confidence: f64) -> f64 {
    let mut sorted = outcomes.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    mathutil::percentile(&sorted, confidence * 100.0)
}

/// Conditional Value at Risk: mean of outcomes at or beyond VaR, falling
/// back to VaR itself when the tail is empty.
pub fn conditional_value_at_risk(outcomes: &[f64], confidence: f64) -> f64 {
    let var = value_at_risk(outcomes, confidence);
    let tail: Vec<f64> = outcomes.iter().cloned().filter(|&x| x >= var).collect();
    if tail.is_empty() {
        var
    } else {
        mathutil::mean(&tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compliance_probability_matches_fraction_within_target() {
        let outcomes: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        let report = budget_compliance(&outcomes, 80.0, &[10.0, 50.0, 90.0], &[0.90]);
        assert!((report.compliance_probability - 0.80).abs() < 1e-9);
        assert_eq!(report.tier, ComplianceTier::Medium);
    }

    #[test]
    fn compliance_tier_very_high_above_95_percent() {
        let outcomes: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        let report = budget_compliance(&outcomes, 96.0, &[50.0], &[0.90]);
        assert_eq!(report.tier, ComplianceTier::VeryHigh);
    }

    #[test]
    fn cost_at_risk_is_zero_when_nothing_exceeds_target() {
        let outcomes = vec![1.0, 2.0, 3.0];
        let report = budget_compliance(&outcomes, 100.0, &[50.0], &[0.90]);
        assert_eq!(report.at_risk, 0.0);
    }

    #[test]
    fn cvar_is_at_least_var() {
        let outcomes: Vec<f64> = (1..=1000).map(|x| x as f64).collect();
        let var = value_at_risk(&outcomes, 0.95);
        let cvar = conditional_value_at_risk(&outcomes, 0.95);
        assert!(cvar >= var);
    }
}
