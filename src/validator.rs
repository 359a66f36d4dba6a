//! Component K — model validation and change detection (§4.K).

use crate::correlation::{self, CorrelationMatrix, MatrixValidation};
use crate::distributions::{self, Distribution, GoodnessOfFit};
use crate::error::Result;
use crate::model::Risk;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelValidationReport {
    pub matrix: Option<MatrixValidation>,
    pub goodness_of_fit: HashMap<String, GoodnessOfFit>,
    pub advisories: Vec<String>,
    pub is_valid: bool,
}

/// §4.K "Validation": composes goodness-of-fit (when historical samples
/// are supplied per risk), matrix checks, and consistency checks (every
/// risk referenced by the correlation matrix must exist; strong
/// cross-impact-type correlations are advisory, not fatal).
pub fn validate_model(
    risks: &[Risk],
    correlations: Option<&CorrelationMatrix>,
    historical_samples: &HashMap<String, Vec<f64>>,
) -> Result<ModelValidationReport> {
    let mut advisories = Vec::new();
    let mut is_valid = true;

    let matrix = match correlations {
        Some(cm) => {
            for id in &cm.risk_ids {
                if !risks.iter().any(|r| &r.id == id) {
                    advisories.push(format!("correlation matrix references unknown risk '{id}'"));
                    is_valid = false;
                }
            }
            let v = correlation::validate(cm)?;
            if !v.is_valid {
                is_valid = false;
            }
            for i in 0..cm.risk_ids.len() {
                for j in (i + 1)..cm.risk_ids.len() {
                    let id_a = &cm.risk_ids[i];
                    let id_b = &cm.risk_ids[j];
                    let rho = cm.get(id_a, id_b);
                    if rho.abs() > 0.7 {
                        if let (Some(ra), Some(rb)) = (risks.iter().find(|r| &r.id == id_a), risks.iter().find(|r| &r.id == id_b)) {
                            if ra.impact_type != rb.impact_type {
                                advisories.push(format!(
                                    "strong correlation ({rho:.2}) between risks '{id_a}' and '{id_b}' across different impact types"
                                ));
                            }
                        }
                    }
                }
            }
            Some(v)
        }
        None => None,
    };

    let mut goodness_of_fit = HashMap::new();
    for risk in risks {
        if let Some(samples) = historical_samples.get(&risk.id) {
            let gof = distributions::goodness_of_fit(&risk.distribution, samples);
            if gof.quality_score < 0.3 {
                advisories.push(format!("risk '{}' distribution fits its historical sample poorly (quality {:.2})", risk.id, gof.quality_score));
            }
            goodness_of_fit.insert(risk.id.clone(), gof);
        }
    }

    Ok(ModelValidationReport { matrix, goodness_of_fit, advisories, is_valid })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelChange {
    RiskAdded { risk_id: String },
    RiskRemoved { risk_id: String },
    DistributionTypeChanged { risk_id: String, from: String, to: String },
    ParameterChanged { risk_id: String, parameter: String, from: f64, to: f64, severity: ChangeSeverity },
    BaselineImpactChanged { risk_id: String, from: f64, to: f64, severity: ChangeSeverity },
    CategoryOrImpactTypeFlipped { risk_id: String },
    CorrelationChanged { risk_a: String, risk_b: String, from: f64, to: f64, severity: ChangeSeverity },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeReport {
    pub changes: Vec<ModelChange>,
    pub counts_by_severity: HashMap<String, usize>,
    pub recommendations: Vec<String>,
}

fn relative_severity(from: f64, to: f64) -> ChangeSeverity {
    let denom = from.abs().max(1e-12);
    let rel = (to - from).abs() / denom;
    if rel > 0.50 {
        ChangeSeverity::Critical
    } else if rel > 0.20 {
        ChangeSeverity::High
    } else if rel > 0.05 {
        ChangeSeverity::Medium
    } else {
        ChangeSeverity::Low
    }
}

fn correlation_severity(delta: f64) -> ChangeSeverity {
    let d = delta.abs();
    if d > 0.5 {
        ChangeSeverity::Critical
    } else if d > 0.3 {
        ChangeSeverity::High
    } else if d > 0.1 {
        ChangeSeverity::Medium
    } else {
        ChangeSeverity::Low
    }
}

fn distribution_params(dist: &Distribution) -> Vec<(&'static str, f64)> {
    match dist {
        Distribution::Normal { mean, std, .. } => vec![("mean", *mean), ("std", *std)],
        Distribution::Triangular { min, mode, max, .. } => vec![("min", *min), ("mode", *mode), ("max", *max)],
        Distribution::Uniform { min, max, .. } => vec![("min", *min), ("max", *max)],
        Distribution::Beta { alpha, beta, .. } => vec![("alpha", *alpha), ("beta", *beta)],
        Distribution::Lognormal { mu, sigma, .. } => vec![("mu", *mu), ("sigma", *sigma)],
    }
}

/// §4.K "Change detection": compares a current model against a baseline.
pub fn detect_changes(
    baseline_risks: &[Risk],
    current_risks: &[Risk],
    baseline_correlations: Option<&CorrelationMatrix>,
    current_correlations: Option<&CorrelationMatrix>,
    parameter_sensitivity: f64,
) -> ChangeReport {
    let mut changes = Vec::new();

    let baseline_ids: std::collections::HashSet<&str> = baseline_risks.iter().map(|r| r.id.as_str()).collect();
    let current_ids: std::collections::HashSet<&str> = current_risks.iter().map(|r| r.id.as_str()).collect();

    for id in current_ids.difference(&baseline_ids) {
        changes.push(ModelChange::RiskAdded { risk_id: id.to_string() });
    }
    for id in baseline_ids.difference(&current_ids) {
        changes.push(ModelChange::RiskRemoved { risk_id: id.to_string() });
    }

    for base in baseline_risks {
        let Some(curr) = current_risks.iter().find(|r| r.id == base.id) else { continue };

        if base.distribution.family() != curr.distribution.family() {
            changes.push(ModelChange::DistributionTypeChanged {
                risk_id: base.id.clone(),
                from: format!("{:?}", base.distribution.family()),
                to: format!("{:?}", curr.distribution.family()),
            });
        } else {
            let base_params = distribution_params(&base.distribution);
            let curr_params = distribution_params(&curr.distribution);
            for ((name, from), (_, to)) in base_params.iter().zip(curr_params.iter()) {
                if (to - from).abs() > parameter_sensitivity {
                    changes.push(ModelChange::ParameterChanged {
                        risk_id: base.id.clone(),
                        parameter: name.to_string(),
                        from: *from,
                        to: *to,
                        severity: relative_severity(*from, *to),
                    });
                }
            }
        }

        if (curr.baseline_impact - base.baseline_impact).abs() > parameter_sensitivity {
            changes.push(ModelChange::BaselineImpactChanged {
                risk_id: base.id.clone(),
                from: base.baseline_impact,
                to: curr.baseline_impact,
                severity: relative_severity(base.baseline_impact, curr.baseline_impact),
            });
        }

        if base.category != curr.category || base.impact_type != curr.impact_type {
            changes.push(ModelChange::CategoryOrImpactTypeFlipped { risk_id: base.id.clone() });
        }
    }

    if let (Some(base_cm), Some(curr_cm)) = (baseline_correlations, current_correlations) {
        let mut seen = std::collections::HashSet::new();
        for (pair, &from) in base_cm.pairs() {
            seen.insert(pair.clone());
            let to = curr_cm.get(&pair.0, &pair.1);
            if (to - from).abs() > 1e-9 {
                changes.push(ModelChange::CorrelationChanged { risk_a: pair.0.clone(), risk_b: pair.1.clone(), from, to, severity: correlation_severity(to - from) });
            }
        }
        for (pair, &to) in curr_cm.pairs() {
            if !seen.contains(pair) {
                changes.push(ModelChange::CorrelationChanged { risk_a: pair.0.clone(), risk_b: pair.1.clone(), from: 0.0, to, severity: correlation_severity(to) });
            }
        }
    }

    let mut counts_by_severity = HashMap::new();
    for change in &changes {
        if let Some(sev) = change_severity(change) {
            *counts_by_severity.entry(format!("{sev:?}").to_lowercase()).or_insert(0) += 1;
        }
    }

    let mut recommendations = Vec::new();
    if changes.iter().any(|c| matches!(c, ModelChange::DistributionTypeChanged { .. })) {
        recommendations.push("Distribution fitting: re-run KS and Q-Q diagnostics on the affected risks".to_string());
    }
    if changes.iter().any(|c| matches!(c, ModelChange::CorrelationChanged { .. })) {
        recommendations.push("Correlation matrix: re-validate PSD and condition number before the next simulation run".to_string());
    }
    if changes.iter().any(|c| matches!(c, ModelChange::RiskAdded { .. } | ModelChange::RiskRemoved { .. })) {
        recommendations.push("Risk register: confirm downstream scenarios reference the updated risk set".to_string());
    }

    ChangeReport { changes, counts_by_severity, recommendations }
}

fn change_severity(change: &ModelChange) -> Option<ChangeSeverity> {
    match change {
        ModelChange::ParameterChanged { severity, .. }
        | ModelChange::BaselineImpactChanged { severity, .. }
        | ModelChange::CorrelationChanged { severity, .. } => Some(*severity),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImpactType, RiskCategory};

    fn risk(id: &str, baseline: f64) -> Risk {
        Risk::new(id, id, RiskCategory::Cost, ImpactType::Cost, Distribution::normal(10.0, 2.0).unwrap(), baseline).unwrap()
    }

    #[test]
    fn added_and_removed_risks_are_detected() {
        let baseline = vec![risk("a", 1.0), risk("b", 1.0)];
        let current = vec![risk("b", 1.0), risk("c", 1.0)];
        let report = detect_changes(&baseline, &current, None, None, 1e-6);
        assert!(report.changes.iter().any(|c| matches!(c, ModelChange::RiskAdded { risk_id } if risk_id == "c")));
        assert!(report.changes.iter().any(|c| matches!(c, ModelChange::RiskRemoved { risk_id } if risk_id == "a")));
    }

    #[test]
    fn large_baseline_impact_delta_is_critical() {
        let baseline = vec![risk("a", 100.0)];
        let current = vec![risk("a", 300.0)];
        let report = detect_changes(&baseline, &current, None, None, 1e-6);
        let change = report.changes.iter().find(|c| matches!(c, ModelChange::BaselineImpactChanged { .. })).unwrap();
        if let ModelChange::BaselineImpactChanged { severity, .. } = change {
            assert_eq!(*severity, ChangeSeverity::Critical);
        }
    }

    #[test]
    fn sub_sensitivity_parameter_drift_is_ignored() {
        let baseline = vec![risk("a", 1.0)];
        let current = vec![risk("a", 1.0 + 1e-9)];
        let report = detect_changes(&baseline, &current, None, None, 1e-6);
        assert!(report.changes.is_empty());
    }

    #[test]
    fn matrix_referencing_unknown_risk_is_invalid() {
        let risks = vec![risk("a", 1.0)];
        let mut cm = CorrelationMatrix::new(vec!["a".to_string(), "ghost".to_string()]);
        cm.set("a", "ghost", 0.3).unwrap();
        let report = validate_model(&risks, Some(&cm), &HashMap::new()).unwrap();
        assert!(!report.is_valid);
    }
}
