//! Component I — scenario generation, mitigation analysis, and sensitivity
//! analysis (§4.I). Scenarios own a deep copy of every risk (DESIGN.md
//! "Owned scenarios, not reference webs") so mutation never leaks between
//! scenarios sharing a common base.

use crate::distributions::Distribution;
use crate::error::Result;
use crate::model::{MitigationStrategy, Risk, RiskModification, Scenario};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// §4.I "Scenario creation": deep-copies `base_risks`, then applies each
/// modification with distribution-specific safety.
pub fn create_scenario(
    id: impl Into<String>,
    name: impl Into<String>,
    description: impl Into<String>,
    base_risks: &[Risk],
    modifications: HashMap<String, RiskModification>,
) -> Scenario {
    let mut risks: Vec<Risk> = base_risks.to_vec();
    for risk in &mut risks {
        if let Some(m) = modifications.get(&risk.id) {
            apply_modification(risk, m);
        }
    }
    Scenario { id: id.into(), name: name.into(), description: description.into(), risks, modifications, results: None }
}

fn apply_modification(risk: &mut Risk, modification: &RiskModification) {
    if let Some(delta) = modification.baseline_impact_delta {
        risk.baseline_impact += delta;
    }
    if let Some(dist) = &modification.distribution_override {
        risk.distribution = dist.clone();
    }
    reproject_distribution(&mut risk.distribution);
    if let Some(mitigation_id) = &modification.applied_mitigation_id {
        if let Some(strategy) = risk.mitigation_strategies.iter().find(|s| &s.id == mitigation_id).cloned() {
            apply_mitigation_to_risk(risk, &strategy);
        }
    }
}

/// Re-projects distribution parameters onto their valid domain after a
/// delta is applied: triangular back onto `min <= mode <= max`, uniform
/// onto `min < max`. Other families need no re-projection.
fn reproject_distribution(dist: &mut Distribution) {
    match dist {
        Distribution::Triangular { min, mode, max, .. } => {
            if *min > *max {
                std::mem::swap(min, max);
            }
            *mode = mode.clamp(*min, *max);
            if *min >= *max {
                *max = *min + 1e-6 * min.abs().max(1.0);
            }
        }
        Distribution::Uniform { min, max, .. } => {
            if *min >= *max {
                *max = *min + 1e-6 * min.abs().max(1.0);
            }
        }
        _ => {}
    }
}

/// §4.I "Mitigation analysis" applied in-place to a risk's parameters when
/// a mitigation is selected on scenario creation.
fn apply_mitigation_to_risk(risk: &mut Risk, strategy: &MitigationStrategy) {
    let e = strategy.effectiveness;
    risk.baseline_impact *= 1.0 - e;
    if let Distribution::Triangular { mode, max, min, .. } = &mut risk.distribution {
        *mode *= 1.0 - e;
        *max *= 1.0 - e;
        *min *= (1.0 - e).max(0.5);
        if *min >= *max {
            *max = *min + 1e-6 * min.abs().max(1.0);
        }
        *mode = mode.clamp(*min, *max);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitigationAnalysis {
    pub baseline_risk: f64,
    pub mitigated_risk: f64,
    pub reduction: f64,
    pub cost_benefit_ratio: f64,
    pub npv: f64,
    pub roi: f64,
    pub expected_value: f64,
}

/// §4.I "Mitigation analysis": cost-benefit, simplified NPV, ROI, and the
/// expected value of applying a mitigation under a realization probability.
pub fn analyze_mitigation(baseline_impact: f64, strategy: &MitigationStrategy) -> MitigationAnalysis {
    let mitigated = baseline_impact * (1.0 - strategy.effectiveness);
    let reduction = baseline_impact * strategy.effectiveness;
    let cost_benefit_ratio = if reduction.abs() > 1e-12 { strategy.cost / reduction } else { f64::INFINITY };
    let npv = reduction - strategy.cost;
    let roi = if strategy.cost.abs() > 1e-12 { (reduction - strategy.cost) / strategy.cost } else { f64::INFINITY };
    let expected_value = strategy.realization_probability * reduction - strategy.cost;
    MitigationAnalysis {
        baseline_risk: baseline_impact,
        mitigated_risk: mitigated,
        reduction,
        cost_benefit_ratio,
        npv,
        roi,
        expected_value,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityVariable {
    pub risk_id: String,
    pub variation: f64,
    pub sensitivity_ratio: f64,
    pub low_scenario: Scenario,
    pub high_scenario: Scenario,
}

/// §4.I "Sensitivity analysis": for each targeted risk and variation `v`,
/// build low/high scenarios with `baseline_impact` scaled by `(1-v)`/`(1+v)`.
/// Tornado-diagram ordering is `variables` sorted by `|sensitivity_ratio|`
/// descending.
pub fn sensitivity_analysis(base_risks: &[Risk], targets: &[(String, f64)]) -> Result<Vec<SensitivityVariable>> {
    let mut variables = Vec::with_capacity(targets.len());
    for (risk_id, v) in targets {
        let low_mods: HashMap<String, RiskModification> = std::iter::once((
            risk_id.clone(),
            RiskModification {
                baseline_impact_delta: Some(find_baseline(base_risks, risk_id)? * -v),
                distribution_override: None,
                applied_mitigation_id: None,
            },
        ))
        .collect();
        let high_mods: HashMap<String, RiskModification> = std::iter::once((
            risk_id.clone(),
            RiskModification {
                baseline_impact_delta: Some(find_baseline(base_risks, risk_id)? * v),
                distribution_override: None,
                applied_mitigation_id: None,
            },
        ))
        .collect();
        let low = create_scenario(format!("{risk_id}-low"), format!("{risk_id} low"), "sensitivity low scenario", base_risks, low_mods);
        let high = create_scenario(format!("{risk_id}-high"), format!("{risk_id} high"), "sensitivity high scenario", base_risks, high_mods);
        variables.push(SensitivityVariable { risk_id: risk_id.clone(), variation: *v, sensitivity_ratio: 2.0 * v, low_scenario: low, high_scenario: high });
    }
    variables.sort_by(|a, b| b.sensitivity_ratio.abs().partial_cmp(&a.sensitivity_ratio.abs()).unwrap());
    Ok(variables)
}

fn find_baseline(risks: &[Risk], id: &str) -> Result<f64> {
    risks
        .iter()
        .find(|r| r.id == id)
        .map(|r| r.baseline_impact)
        .ok_or_else(|| crate::error::MonteCarloError::validation("sensitivity target", format!("unknown risk id '{id}'")))
}

/// §4.I "Isolation validation": confirm no risk, distribution, or
/// mitigation-strategy backing allocation is shared by identity between
/// two scenarios that share risk IDs.
pub fn validate_isolation(a: &Scenario, b: &Scenario) -> bool {
    for ra in &a.risks {
        for rb in &b.risks {
            if ra.id == rb.id {
                if std::ptr::eq(ra.id.as_ptr(), rb.id.as_ptr()) {
                    return false;
                }
                if let (Some(sa), Some(sb)) = (ra.mitigation_strategies.first(), rb.mitigation_strategies.first()) {
                    if std::ptr::eq(sa, sb) {
                        return false;
                    }
                }
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImpactType, RiskCategory};

    fn base_risk(id: &str, baseline: f64) -> Risk {
        Risk::new(id, id, RiskCategory::Cost, ImpactType::Cost, Distribution::triangular(100.0, 200.0, 500.0).unwrap(), baseline).unwrap()
    }

    #[test]
    fn scenarios_from_shared_base_are_isolated() {
        let base = vec![base_risk("r1", 1.0)];
        let s1 = create_scenario("s1", "s1", "", &base, HashMap::new());
        let s2 = create_scenario("s2", "s2", "", &base, HashMap::new());
        assert!(validate_isolation(&s1, &s2));
    }

    #[test]
    fn mutating_one_scenario_risk_does_not_affect_another() {
        let base = vec![base_risk("r1", 1.0)];
        let mut s1 = create_scenario("s1", "s1", "", &base, HashMap::new());
        let s2 = create_scenario("s2", "s2", "", &base, HashMap::new());
        s1.risks[0].baseline_impact = 999.0;
        assert_eq!(s2.risks[0].baseline_impact, 1.0);
    }

    #[test]
    fn triangular_modification_stays_ordered() {
        let base = vec![base_risk("r1", 1.0)];
        let mut mods = HashMap::new();
        mods.insert(
            "r1".to_string(),
            RiskModification { baseline_impact_delta: None, distribution_override: Some(Distribution::triangular(100.0, 600.0, 500.0).unwrap_or(Distribution::triangular(100.0, 200.0, 500.0).unwrap())), applied_mitigation_id: None },
        );
        let s = create_scenario("s1", "s1", "", &base, mods);
        if let Distribution::Triangular { min, mode, max, .. } = &s.risks[0].distribution {
            assert!(min <= mode && mode <= max);
        } else {
            panic!("expected triangular");
        }
    }

    #[test]
    fn sensitivity_ratio_is_twice_variation() {
        let base = vec![base_risk("r1", 100.0)];
        let vars = sensitivity_analysis(&base, &[("r1".to_string(), 0.2)]).unwrap();
        assert!((vars[0].sensitivity_ratio - 0.4).abs() < 1e-9);
    }

    #[test]
    fn mitigation_reduces_baseline_impact_and_has_positive_reduction() {
        let strategy = MitigationStrategy { id: "m1".into(), name: "redesign".into(), cost: 10.0, effectiveness: 0.5, realization_probability: 0.8 };
        let analysis = analyze_mitigation(100.0, &strategy);
        assert_eq!(analysis.mitigated_risk, 50.0);
        assert_eq!(analysis.reduction, 50.0);
        assert_eq!(analysis.npv, 40.0);
    }
}
