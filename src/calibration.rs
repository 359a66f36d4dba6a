//! Component J — fitting from historical completed-project records,
//! similarity retrieval, parameter suggestions, and prediction accuracy
//! (§4.J).

use crate::distributions::{self, FitReport};
use crate::error::{MonteCarloError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

const MIN_CALIBRATION_SAMPLES: usize = 10;
const MIN_SUGGESTION_SAMPLES: usize = 3;
const MEAN_DIVERGENCE_THRESHOLD: f64 = 0.10;
const STD_DIVERGENCE_THRESHOLD: f64 = 0.15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedProject {
    pub id: String,
    pub project_type: String,
    pub characteristics: HashMap<String, f64>,
    pub actual_cost: f64,
    pub actual_duration: f64,
    pub baseline_cost: f64,
    pub baseline_duration: f64,
    pub realized_impacts: HashMap<String, f64>,
}

/// §4.J "Project-type equivalence classes" — projects within the same
/// class are treated as comparable even when `project_type` differs.
fn equivalence_class(project_type: &str) -> &'static str {
    match project_type {
        "construction" | "infrastructure" => "construction",
        "software" | "research" => "software",
        _ => "other",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub risk_id: String,
    pub fit: FitReport,
    pub ks_p_value: f64,
    pub sample_size: usize,
    pub method: &'static str,
}

/// §4.J "Fitting from completed projects": pool the realized-impact
/// samples for `risk_id` (optionally filtered to one project type),
/// require at least 10, and fit the best candidate family.
pub fn fit_from_history(projects: &[CompletedProject], risk_id: &str, project_type: Option<&str>) -> Result<CalibrationResult> {
    let samples: Vec<f64> = projects
        .iter()
        .filter(|p| project_type.map(|t| equivalence_class(&p.project_type) == equivalence_class(t)).unwrap_or(true))
        .filter_map(|p| p.realized_impacts.get(risk_id).copied())
        .collect();

    if samples.len() < MIN_CALIBRATION_SAMPLES {
        return Err(MonteCarloError::domain(format!(
            "only {} realized samples for risk '{risk_id}', need at least {MIN_CALIBRATION_SAMPLES}",
            samples.len()
        )));
    }

    let fit = distributions::fit_best(&samples)?;
    Ok(CalibrationResult { risk_id: risk_id.to_string(), ks_p_value: fit.best.ks_p_value, sample_size: samples.len(), fit, method: "mle" })
}

/// §4.J "Similarity retrieval": matching characteristics over common
/// characteristics, numeric fields compared within 20% relative
/// tolerance.
pub fn project_similarity(a: &CompletedProject, b: &CompletedProject) -> f64 {
    let keys_a: HashSet<&str> = a.characteristics.keys().map(|s| s.as_str()).collect();
    let keys_b: HashSet<&str> = b.characteristics.keys().map(|s| s.as_str()).collect();
    let common: Vec<&str> = keys_a.intersection(&keys_b).copied().collect();
    if common.is_empty() {
        return if equivalence_class(&a.project_type) == equivalence_class(&b.project_type) { 0.5 } else { 0.0 };
    }
    let matches = common
        .iter()
        .filter(|&&k| {
            let va = a.characteristics[k];
            let vb = b.characteristics[k];
            let denom = va.abs().max(vb.abs()).max(1e-12);
            ((va - vb).abs() / denom) <= 0.20
        })
        .count();
    let class_bonus = if equivalence_class(&a.project_type) == equivalence_class(&b.project_type) { 0.0 } else { -1.0 };
    (matches as f64 / common.len() as f64 + class_bonus).max(0.0)
}

/// Symmetric frozen-pair cache key for project-similarity lookups.
pub fn similarity_cache_key(a_id: &str, b_id: &str) -> (String, String) {
    if a_id <= b_id {
        (a_id.to_string(), b_id.to_string())
    } else {
        (b_id.to_string(), a_id.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSuggestion {
    pub risk_id: String,
    pub suggested_mean: f64,
    pub suggested_std: f64,
    pub current_mean: f64,
    pub current_std: f64,
    pub sample_size: usize,
    pub confidence: f64,
}

/// §4.J "Parameter suggestions": find similar projects for `target`
/// (score >= `threshold`), pool realized impacts for `risk_id`, and emit
/// a suggestion only when the divergence from the current parameters is
/// material.
pub fn suggest_parameters(
    target: &CompletedProject,
    history: &[CompletedProject],
    risk_id: &str,
    current_mean: f64,
    current_std: f64,
    threshold: f64,
) -> Option<ParameterSuggestion> {
    let samples: Vec<f64> = history
        .iter()
        .filter(|p| p.id != target.id)
        .filter(|p| project_similarity(target, p) >= threshold)
        .filter_map(|p| p.realized_impacts.get(risk_id).copied())
        .collect();

    if samples.len() < MIN_SUGGESTION_SAMPLES {
        return None;
    }

    let suggested_mean = crate::mathutil::mean(&samples);
    let suggested_std = crate::mathutil::sample_std(&samples);

    let mean_divergence = if current_mean.abs() > 1e-12 { (suggested_mean - current_mean).abs() / current_mean.abs() } else { 0.0 };
    let std_divergence = if current_std.abs() > 1e-12 { (suggested_std - current_std).abs() / current_std.abs() } else { 0.0 };

    if mean_divergence <= MEAN_DIVERGENCE_THRESHOLD && std_divergence <= STD_DIVERGENCE_THRESHOLD {
        return None;
    }

    let confidence = (samples.len() as f64 / 30.0).min(1.0);
    Some(ParameterSuggestion { risk_id: risk_id.to_string(), suggested_mean, suggested_std, current_mean, current_std, sample_size: samples.len(), confidence })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionAccuracy {
    pub mae: f64,
    pub rmse: f64,
    pub mape: f64,
    pub r_squared: f64,
    pub bias: f64,
    pub interval_coverage: HashMap<u32, f64>,
}

/// §4.J "Prediction accuracy": predicted median vs. actual, plus
/// per-confidence-level interval coverage.
pub fn prediction_accuracy(
    predicted: &[f64],
    actual: &[f64],
    intervals: &HashMap<u32, Vec<(f64, f64)>>,
) -> PredictionAccuracy {
    let n = predicted.len().max(1) as f64;
    let errors: Vec<f64> = predicted.iter().zip(actual).map(|(p, a)| p - a).collect();
    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
    let rmse = (errors.iter().map(|e| e * e).sum::<f64>() / n).sqrt();
    let mape = predicted
        .iter()
        .zip(actual)
        .filter(|(_, &a)| a.abs() > 1e-12)
        .map(|(p, a)| ((p - a) / a).abs())
        .sum::<f64>()
        / n
        * 100.0;
    let bias = errors.iter().sum::<f64>() / n;

    let actual_mean = crate::mathutil::mean(actual);
    let ss_tot: f64 = actual.iter().map(|a| (a - actual_mean).powi(2)).sum();
    let ss_res: f64 = errors.iter().map(|e| e * e).sum();
    let r_squared = if ss_tot.abs() > 1e-12 { 1.0 - ss_res / ss_tot } else { 0.0 };

    let mut interval_coverage = HashMap::new();
    for (&level, bounds) in intervals {
        let covered = bounds.iter().zip(actual).filter(|((lo, hi), &a)| a >= *lo && a <= *hi).count();
        interval_coverage.insert(level, covered as f64 / actual.len().max(1) as f64);
    }

    PredictionAccuracy { mae, rmse, mape, r_squared, bias, interval_coverage }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(id: &str, project_type: &str, impacts: &[(&str, f64)]) -> CompletedProject {
        CompletedProject {
            id: id.to_string(),
            project_type: project_type.to_string(),
            characteristics: HashMap::new(),
            actual_cost: 0.0,
            actual_duration: 0.0,
            baseline_cost: 0.0,
            baseline_duration: 0.0,
            realized_impacts: impacts.iter().map(|&(k, v)| (k.to_string(), v)).collect(),
        }
    }

    #[test]
    fn fit_from_history_requires_minimum_sample_size() {
        let projects: Vec<CompletedProject> = (0..5).map(|i| project(&format!("p{i}"), "construction", &[("r1", 100.0 + i as f64)])).collect();
        assert!(fit_from_history(&projects, "r1", None).is_err());
    }

    #[test]
    fn fit_from_history_succeeds_with_enough_samples() {
        let projects: Vec<CompletedProject> = (0..20).map(|i| project(&format!("p{i}"), "construction", &[("r1", 100.0 + (i as f64) * 3.0)])).collect();
        let result = fit_from_history(&projects, "r1", None).unwrap();
        assert_eq!(result.sample_size, 20);
    }

    #[test]
    fn equivalent_project_types_count_as_matching_for_similarity() {
        let mut a = project("a", "construction", &[]);
        let mut b = project("b", "infrastructure", &[]);
        a.characteristics.insert("size".to_string(), 100.0);
        b.characteristics.insert("size".to_string(), 105.0);
        let score = project_similarity(&a, &b);
        assert!(score > 0.0);
    }

    #[test]
    fn similarity_cache_key_is_symmetric() {
        assert_eq!(similarity_cache_key("a", "b"), similarity_cache_key("b", "a"));
    }

    #[test]
    fn suggestion_is_none_below_minimum_samples() {
        let target = project("t", "construction", &[]);
        let history: Vec<CompletedProject> = (0..2).map(|i| project(&format!("h{i}"), "construction", &[("r1", 500.0)])).collect();
        assert!(suggest_parameters(&target, &history, "r1", 100.0, 10.0, 0.0).is_none());
    }

    #[test]
    fn prediction_accuracy_is_zero_error_for_perfect_predictions() {
        let actual = vec![100.0, 200.0, 300.0];
        let predicted = actual.clone();
        let report = prediction_accuracy(&predicted, &actual, &HashMap::new());
        assert!(report.mae < 1e-9);
        assert!(report.rmse < 1e-9);
        assert!((report.r_squared - 1.0).abs() < 1e-9);
    }
}
