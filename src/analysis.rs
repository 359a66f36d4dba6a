//! Component F — percentile/CI/descriptive statistics, risk-contribution
//! ranking, and scenario comparison (§4.F).

use crate::mathutil;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercentileAnalysis {
    pub percentiles: HashMap<u32, f64>,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub coefficient_of_variation: f64,
}

pub fn percentile_analysis(data: &[f64], percentiles: &[f64]) -> PercentileAnalysis {
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mean = mathutil::mean(data);
    let std = mathutil::sample_std(data);
    PercentileAnalysis {
        percentiles: percentiles.iter().map(|&p| (p as u32, mathutil::percentile(&sorted, p))).collect(),
        mean,
        median: mathutil::percentile(&sorted, 50.0),
        std,
        coefficient_of_variation: if mean.abs() > 1e-12 { std / mean.abs() } else { 0.0 },
    }
}

/// Two-sided confidence interval: `[(alpha/2)*100, (1-alpha/2)*100]` percentiles.
pub fn confidence_interval(data: &[f64], confidence: f64) -> (f64, f64) {
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let alpha = 1.0 - confidence;
    (
        mathutil::percentile(&sorted, alpha / 2.0 * 100.0),
        mathutil::percentile(&sorted, (1.0 - alpha / 2.0) * 100.0),
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptiveStats {
    pub mean: f64,
    pub variance: f64,
    pub std: f64,
    pub skewness: f64,
    pub kurtosis: f64,
}

pub fn descriptive_stats(data: &[f64]) -> DescriptiveStats {
    DescriptiveStats {
        mean: mathutil::mean(data),
        variance: mathutil::sample_variance(data),
        std: mathutil::sample_std(data),
        skewness: mathutil::skewness(data),
        kurtosis: mathutil::kurtosis(data),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskContributionRanking {
    pub risk_id: String,
    pub contribution_pct_of_cost_variance: f64,
    pub cost_correlation: f64,
    pub schedule_correlation: f64,
    pub uncertainty_index: f64,
}

/// §4.F "Risk-contribution ranking": each risk's share of total cost-outcome
/// variance, its correlation with both outcome arrays, and an uncertainty
/// index combining the two. Sorted descending, trimmed to `top_n`.
pub fn rank_risk_contributions(
    risk_contributions: &HashMap<String, Vec<f64>>,
    cost_outcomes: &[f64],
    schedule_outcomes: &[f64],
    top_n: usize,
) -> Vec<RiskContributionRanking> {
    let total_cost_variance = mathutil::sample_variance(cost_outcomes).max(1e-12);
    let mut rankings: Vec<RiskContributionRanking> = risk_contributions
        .iter()
        .map(|(id, row)| {
            let row_variance = mathutil::sample_variance(row);
            let pct = (row_variance / total_cost_variance) * 100.0;
            let cost_corr = mathutil::pearson_correlation(row, cost_outcomes);
            let sched_corr = mathutil::pearson_correlation(row, schedule_outcomes);
            RiskContributionRanking {
                risk_id: id.clone(),
                contribution_pct_of_cost_variance: pct,
                cost_correlation: cost_corr,
                schedule_correlation: sched_corr,
                uncertainty_index: pct * cost_corr.abs(),
            }
        })
        .collect();
    rankings.sort_by(|a, b| b.uncertainty_index.partial_cmp(&a.uncertainty_index).unwrap());
    rankings.truncate(top_n);
    rankings
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectSizeInterpretation {
    Negligible,
    Small,
    Medium,
    Large,
}

fn interpret_cohens_d(d: f64) -> EffectSizeInterpretation {
    let ad = d.abs();
    if ad < 0.2 {
        EffectSizeInterpretation::Negligible
    } else if ad < 0.5 {
        EffectSizeInterpretation::Small
    } else if ad < 0.8 {
        EffectSizeInterpretation::Medium
    } else {
        EffectSizeInterpretation::Large
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioComparison {
    pub welch_t_statistic: f64,
    pub welch_p_value: f64,
    pub mann_whitney_u: f64,
    pub mann_whitney_p_value: f64,
    pub ks_statistic: f64,
    pub cohens_d: f64,
    pub effect_size: EffectSizeInterpretation,
    pub mean_difference: f64,
    pub mean_difference_ci: (f64, f64),
    pub practically_significant: bool,
}

/// Welch's t-test: unequal-variance two-sample mean comparison.
fn welch_t_test(a: &[f64], b: &[f64]) -> (f64, f64) {
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (ma, mb) = (mathutil::mean(a), mathutil::mean(b));
    let (va, vb) = (mathutil::sample_variance(a), mathutil::sample_variance(b));
    let se = (va / na + vb / nb).sqrt().max(1e-300);
    let t = (ma - mb) / se;
    let dof_num = (va / na + vb / nb).powi(2);
    let dof_den = (va / na).powi(2) / (na - 1.0).max(1.0) + (vb / nb).powi(2) / (nb - 1.0).max(1.0);
    let dof = if dof_den > 0.0 { dof_num / dof_den } else { 1.0 };
    let dist = StudentsT::new(0.0, 1.0, dof.max(1.0)).unwrap();
    let p = 2.0 * (1.0 - dist.cdf(t.abs()));
    (t, p.clamp(0.0, 1.0))
}

/// Mann-Whitney U with a normal approximation for the p-value (adequate for
/// the sample sizes produced by Monte Carlo runs).
fn mann_whitney_u(a: &[f64], b: &[f64]) -> (f64, f64) {
    let na = a.len();
    let nb = b.len();
    let mut combined: Vec<(f64, u8)> = a.iter().map(|&x| (x, 0u8)).chain(b.iter().map(|&x| (x, 1u8))).collect();
    combined.sort_by(|x, y| x.0.partial_cmp(&y.0).unwrap());

    let mut ranks = vec![0.0; combined.len()];
    let mut i = 0;
    while i < combined.len() {
        let mut j = i;
        while j + 1 < combined.len() && (combined[j + 1].0 - combined[i].0).abs() < 1e-12 {
            j += 1;
        }
        let avg_rank = ((i + 1) + (j + 1)) as f64 / 2.0;
        for r in ranks.iter_mut().take(j + 1).skip(i) {
            *r = avg_rank;
        }
        i = j + 1;
    }
    let rank_sum_a: f64 = combined.iter().zip(ranks.iter()).filter(|(c, _)| c.1 == 0).map(|(_, &r)| r).sum();
    let u_a = rank_sum_a - (na as f64 * (na as f64 + 1.0)) / 2.0;
    let u = u_a.min(na as f64 * nb as f64 - u_a);

    let mean_u = na as f64 * nb as f64 / 2.0;
    let std_u = (na as f64 * nb as f64 * (na as f64 + nb as f64 + 1.0) / 12.0).sqrt().max(1e-12);
    let z = (u - mean_u) / std_u;
    let normal = statrs::distribution::Normal::new(0.0, 1.0).unwrap();
    let p = 2.0 * normal.cdf(-z.abs());
    (u, p.clamp(0.0, 1.0))
}

fn two_sample_ks(a: &[f64], b: &[f64]) -> f64 {
    let mut all: Vec<f64> = a.iter().chain(b.iter()).cloned().collect();
    all.sort_by(|x, y| x.partial_cmp(y).unwrap());
    all.dedup();
    let mut sorted_a = a.to_vec();
    let mut sorted_b = b.to_vec();
    sorted_a.sort_by(|x, y| x.partial_cmp(y).unwrap());
    sorted_b.sort_by(|x, y| x.partial_cmp(y).unwrap());
    let cdf = |sorted: &[f64], x: f64| sorted.partition_point(|&v| v <= x) as f64 / sorted.len() as f64;
    all.into_iter().map(|x| (cdf(&sorted_a, x) - cdf(&sorted_b, x)).abs()).fold(0.0, f64::max)
}

/// §4.F "Scenario comparison": Welch t-test, Mann-Whitney U, two-sample KS,
/// Cohen's d with a practical-significance flag.
pub fn compare_scenarios(baseline: &[f64], modified: &[f64]) -> ScenarioComparison {
    let (t, t_p) = welch_t_test(modified, baseline);
    let (u, u_p) = mann_whitney_u(modified, baseline);
    let ks = two_sample_ks(modified, baseline);

    let (na, nb) = (baseline.len() as f64, modified.len() as f64);
    let (va, vb) = (mathutil::sample_variance(baseline), mathutil::sample_variance(modified));
    let pooled_std = (((na - 1.0) * va + (nb - 1.0) * vb) / (na + nb - 2.0).max(1.0)).sqrt().max(1e-12);
    let mean_diff = mathutil::mean(modified) - mathutil::mean(baseline);
    let d = mean_diff / pooled_std;

    let se_diff = (va / na + vb / nb).sqrt();
    let ci = (mean_diff - 1.96 * se_diff, mean_diff + 1.96 * se_diff);

    let baseline_mean = mathutil::mean(baseline);
    let relative_diff = if baseline_mean.abs() > 1e-12 { mean_diff / baseline_mean } else { 0.0 };

    ScenarioComparison {
        welch_t_statistic: t,
        welch_p_value: t_p,
        mann_whitney_u: u,
        mann_whitney_p_value: u_p,
        ks_statistic: ks,
        cohens_d: d,
        effect_size: interpret_cohens_d(d),
        mean_difference: mean_diff,
        mean_difference_ci: ci,
        practically_significant: relative_diff.abs() > 0.05,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_analysis_matches_known_distribution() {
        let data: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        let report = percentile_analysis(&data, &[50.0]);
        assert!((report.median - 50.5).abs() < 1.0);
    }

    #[test]
    fn identical_samples_are_not_practically_significant() {
        let a: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.001).sin() + 100.0).collect();
        let comparison = compare_scenarios(&a, &a);
        assert!((comparison.mean_difference).abs() < 1e-9);
        assert!(!comparison.practically_significant);
        assert_eq!(comparison.effect_size, EffectSizeInterpretation::Negligible);
    }

    #[test]
    fn shifted_distribution_is_detected() {
        let a: Vec<f64> = (0..500).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..500).map(|i| i as f64 + 1000.0).collect();
        let comparison = compare_scenarios(&a, &b);
        assert!(comparison.welch_p_value < 0.01);
        assert_eq!(comparison.effect_size, EffectSizeInterpretation::Large);
        assert!(comparison.practically_significant);
    }

    #[test]
    fn risk_contributions_rank_by_uncertainty_index() {
        let mut contributions = HashMap::new();
        contributions.insert("high".to_string(), (0..1000).map(|i| (i as f64).sin() * 100.0).collect());
        contributions.insert("low".to_string(), vec![1.0; 1000]);
        let cost: Vec<f64> = (0..1000).map(|i| (i as f64).sin() * 100.0 + 1000.0).collect();
        let schedule: Vec<f64> = vec![30.0; 1000];
        let ranking = rank_risk_contributions(&contributions, &cost, &schedule, 10);
        assert_eq!(ranking[0].risk_id, "high");
    }
}
