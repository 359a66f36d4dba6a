//! Component A — distribution modeling and sampling.
//!
//! Each family validates its own parameters on construction (tagged
//! variants, not a class hierarchy per DESIGN.md), samples via `statrs`,
//! and exposes `cdf`/`quantile` for the correlated-sampling transform
//! in `correlation.rs`.

use crate::error::{MonteCarloError, Result};
use crate::mathutil;
use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Beta as StBeta, Continuous, ContinuousCDF, LogNormal as StLogNormal, Normal as StNormal, Uniform as StUniform};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionFamily {
    Normal,
    Triangular,
    Uniform,
    Beta,
    Lognormal,
}

impl DistributionFamily {
    pub fn all() -> [DistributionFamily; 5] {
        [
            DistributionFamily::Normal,
            DistributionFamily::Triangular,
            DistributionFamily::Uniform,
            DistributionFamily::Beta,
            DistributionFamily::Lognormal,
        ]
    }

    /// Number of free parameters, used for AIC/BIC and chi-square degrees of freedom.
    pub fn param_count(&self) -> usize {
        match self {
            DistributionFamily::Normal => 2,
            DistributionFamily::Triangular => 3,
            DistributionFamily::Uniform => 2,
            DistributionFamily::Beta => 2,
            DistributionFamily::Lognormal => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl Bounds {
    pub fn new(lower: Option<f64>, upper: Option<f64>) -> Self {
        Self { lower, upper }
    }

    fn clip(&self, x: f64) -> f64 {
        let mut v = x;
        if let Some(lo) = self.lower {
            v = v.max(lo);
        }
        if let Some(hi) = self.upper {
            v = v.min(hi);
        }
        v
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Distribution {
    Normal {
        mean: f64,
        std: f64,
        bounds: Option<Bounds>,
    },
    Triangular {
        min: f64,
        mode: f64,
        max: f64,
        bounds: Option<Bounds>,
    },
    Uniform {
        min: f64,
        max: f64,
        bounds: Option<Bounds>,
    },
    Beta {
        alpha: f64,
        beta: f64,
        bounds: Option<Bounds>,
    },
    Lognormal {
        mu: f64,
        sigma: f64,
        bounds: Option<Bounds>,
    },
}

/// Source data for constructing a distribution, per §4.A "Creation from data".
pub enum EstimationSource<'a> {
    Historical(&'a [f64]),
    Pert { optimistic: f64, most_likely: f64, pessimistic: f64 },
    Params(std::collections::HashMap<String, f64>),
}

impl Distribution {
    pub fn family(&self) -> DistributionFamily {
        match self {
            Distribution::Normal { .. } => DistributionFamily::Normal,
            Distribution::Triangular { .. } => DistributionFamily::Triangular,
            Distribution::Uniform { .. } => DistributionFamily::Uniform,
            Distribution::Beta { .. } => DistributionFamily::Beta,
            Distribution::Lognormal { .. } => DistributionFamily::Lognormal,
        }
    }

    pub fn bounds(&self) -> Option<Bounds> {
        match self {
            Distribution::Normal { bounds, .. }
            | Distribution::Triangular { bounds, .. }
            | Distribution::Uniform { bounds, .. }
            | Distribution::Beta { bounds, .. }
            | Distribution::Lognormal { bounds, .. } => *bounds,
        }
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        match &mut self {
            Distribution::Normal { bounds: b, .. }
            | Distribution::Triangular { bounds: b, .. }
            | Distribution::Uniform { bounds: b, .. }
            | Distribution::Beta { bounds: b, .. }
            | Distribution::Lognormal { bounds: b, .. } => *b = Some(bounds),
        }
        self
    }

    pub fn normal(mean: f64, std: f64) -> Result<Self> {
        if !(std > 0.0) {
            return Err(MonteCarloError::validation("std", "must be > 0"));
        }
        if !mean.is_finite() || !std.is_finite() {
            return Err(MonteCarloError::validation("normal params", "must be finite"));
        }
        Ok(Distribution::Normal { mean, std, bounds: None })
    }

    pub fn triangular(min: f64, mode: f64, max: f64) -> Result<Self> {
        if !(min <= mode && mode <= max && min < max) {
            return Err(MonteCarloError::validation(
                "triangular params",
                "require min <= mode <= max and min < max",
            ));
        }
        Ok(Distribution::Triangular { min, mode, max, bounds: None })
    }

    pub fn uniform(min: f64, max: f64) -> Result<Self> {
        if !(min < max) {
            return Err(MonteCarloError::validation("uniform params", "require min < max"));
        }
        Ok(Distribution::Uniform { min, max, bounds: None })
    }

    pub fn beta(alpha: f64, beta: f64) -> Result<Self> {
        if !(alpha > 0.0 && beta > 0.0) {
            return Err(MonteCarloError::validation("beta params", "require alpha > 0, beta > 0"));
        }
        Ok(Distribution::Beta { alpha, beta, bounds: None })
    }

    pub fn lognormal(mu: f64, sigma: f64) -> Result<Self> {
        if !(sigma > 0.0) {
            return Err(MonteCarloError::validation("sigma", "must be > 0"));
        }
        Ok(Distribution::Lognormal { mu, sigma, bounds: None })
    }

    /// §4.A "Creation from data": build a distribution of the given family
    /// from historical samples, a PERT three-point estimate, or an ad-hoc
    /// parameter map.
    pub fn from_source(family: DistributionFamily, source: EstimationSource) -> Result<Self> {
        match source {
            EstimationSource::Historical(data) => Self::from_historical(family, data),
            EstimationSource::Pert { optimistic, most_likely, pessimistic } => {
                Self::from_pert(family, optimistic, most_likely, pessimistic)
            }
            EstimationSource::Params(map) => Self::from_params(family, &map),
        }
    }

    fn from_historical(family: DistributionFamily, data: &[f64]) -> Result<Self> {
        if data.is_empty() {
            return Err(MonteCarloError::validation("historical data", "must be non-empty"));
        }
        match family {
            DistributionFamily::Normal => {
                let mean = mathutil::mean(data);
                let mut std = mathutil::sample_std(data);
                if std <= 0.0 {
                    std = (mean.abs().max(1.0)) * 1e-6;
                }
                Distribution::normal(mean, std)
            }
            DistributionFamily::Triangular => {
                let mut sorted = data.to_vec();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
                let min = sorted[0];
                let max = sorted[sorted.len() - 1];
                let mode = mathutil::median(&sorted);
                let (min, max) = if min >= max {
                    let pad = (min.abs().max(1.0)) * 1e-6;
                    (min - pad, max + pad)
                } else {
                    (min, max)
                };
                let mode = mode.clamp(min, max);
                Distribution::triangular(min, mode, max)
            }
            DistributionFamily::Uniform => {
                let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let range = (max - min).max(1e-9);
                Distribution::uniform(min - 0.05 * range, max + 0.05 * range)
            }
            DistributionFamily::Beta => {
                let mean = mathutil::mean(data);
                let var = mathutil::sample_variance(data).max(1e-9);
                let data_min = data.iter().cloned().fold(f64::INFINITY, f64::min);
                let data_max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let range = (data_max - data_min).max(1e-9);
                let norm_mean = ((mean - data_min) / range).clamp(1e-6, 1.0 - 1e-6);
                let mut norm_var = var / (range * range);
                let bound = norm_mean * (1.0 - norm_mean);
                if norm_var >= bound {
                    norm_var = 0.99 * bound;
                }
                let common = norm_mean * (1.0 - norm_mean) / norm_var - 1.0;
                let alpha = (norm_mean * common).max(1e-3);
                let beta = ((1.0 - norm_mean) * common).max(1e-3);
                let dist = Distribution::beta(alpha, beta)?;
                Ok(dist.with_bounds(Bounds::new(Some(data_min), Some(data_max))))
            }
            DistributionFamily::Lognormal => {
                if data.iter().any(|&x| x <= 0.0) {
                    return Err(MonteCarloError::validation(
                        "lognormal historical data",
                        "all samples must be > 0",
                    ));
                }
                let logs: Vec<f64> = data.iter().map(|x| x.ln()).collect();
                let mu = mathutil::mean(&logs);
                let sigma = mathutil::sample_std(&logs).max(1e-6);
                Distribution::lognormal(mu, sigma)
            }
        }
    }

    fn from_pert(family: DistributionFamily, o: f64, m: f64, p: f64) -> Result<Self> {
        if !(p > o) {
            return Err(MonteCarloError::validation("pert", "pessimistic must be > optimistic"));
        }
        match family {
            DistributionFamily::Normal => {
                let mean = (o + 4.0 * m + p) / 6.0;
                let std = ((p - o) / 6.0).max(1e-9);
                Distribution::normal(mean, std)
            }
            DistributionFamily::Triangular => Distribution::triangular(o, m, p),
            DistributionFamily::Uniform => Distribution::uniform(o, p),
            DistributionFamily::Beta => {
                let norm_mode = ((m - o) / (p - o)).clamp(1e-6, 1.0 - 1e-6);
                let alpha = 6.0 * norm_mode + 1.0;
                let beta = 6.0 * (1.0 - norm_mode) + 1.0;
                let dist = Distribution::beta(alpha, beta)?;
                Ok(dist.with_bounds(Bounds::new(Some(o), Some(p))))
            }
            DistributionFamily::Lognormal => {
                if o <= 0.0 || m <= 0.0 || p <= 0.0 {
                    return Err(MonteCarloError::validation("pert lognormal", "all values must be > 0"));
                }
                let geo_mean = (o.ln() + m.ln() + p.ln()) / 3.0;
                let sigma = ((p.ln() - o.ln()) / 6.0).max(0.1);
                Distribution::lognormal(geo_mean, sigma)
            }
        }
    }

    fn from_params(family: DistributionFamily, map: &std::collections::HashMap<String, f64>) -> Result<Self> {
        let get = |k: &str| -> Result<f64> {
            map.get(k)
                .copied()
                .ok_or_else(|| MonteCarloError::validation("params", format!("missing parameter '{k}'")))
        };
        match family {
            DistributionFamily::Normal => Distribution::normal(get("mean")?, get("std")?),
            DistributionFamily::Triangular => Distribution::triangular(get("min")?, get("mode")?, get("max")?),
            DistributionFamily::Uniform => Distribution::uniform(get("min")?, get("max")?),
            DistributionFamily::Beta => Distribution::beta(get("alpha")?, get("beta")?),
            DistributionFamily::Lognormal => Distribution::lognormal(get("mu")?, get("sigma")?),
        }
    }

    /// Draw `n` samples, finite values within declared bounds (§8 item 1).
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.sample_one(rng)?);
        }
        Ok(out)
    }

    pub fn sample_one<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64> {
        let raw = match self {
            Distribution::Normal { mean, std, .. } => {
                let d = StNormal::new(*mean, *std)
                    .map_err(|e| MonteCarloError::numerical("normal sample", e.to_string()))?;
                rand::distributions::Distribution::sample(&d, rng)
            }
            Distribution::Triangular { min, mode, max, .. } => sample_triangular(rng, *min, *mode, *max),
            Distribution::Uniform { min, max, .. } => {
                let d = StUniform::new(*min, *max)
                    .map_err(|e| MonteCarloError::numerical("uniform sample", e.to_string()))?;
                rand::distributions::Distribution::sample(&d, rng)
            }
            Distribution::Beta { alpha, beta, .. } => {
                let d = StBeta::new(*alpha, *beta)
                    .map_err(|e| MonteCarloError::numerical("beta sample", e.to_string()))?;
                let u = rand::distributions::Distribution::sample(&d, rng);
                rescale_unit_interval(u, self.bounds())
            }
            Distribution::Lognormal { mu, sigma, .. } => {
                let d = StLogNormal::new(*mu, *sigma)
                    .map_err(|e| MonteCarloError::numerical("lognormal sample", e.to_string()))?;
                rand::distributions::Distribution::sample(&d, rng)
            }
        };
        if !raw.is_finite() {
            return Err(MonteCarloError::numerical("distribution sample", "produced non-finite value"));
        }
        Ok(self.clip(raw))
    }

    fn clip(&self, x: f64) -> f64 {
        match self.bounds() {
            Some(b) => b.clip(x),
            None => x,
        }
    }

    /// CDF at `x`, ignoring clipping bounds (used internally for the
    /// correlated-sampling transform and goodness-of-fit tests).
    pub fn cdf(&self, x: f64) -> f64 {
        match self {
            Distribution::Normal { mean, std, .. } => {
                StNormal::new(*mean, *std).map(|d| d.cdf(x)).unwrap_or(f64::NAN)
            }
            Distribution::Triangular { min, mode, max, .. } => triangular_cdf(x, *min, *mode, *max),
            Distribution::Uniform { min, max, .. } => {
                StUniform::new(*min, *max).map(|d| d.cdf(x)).unwrap_or(f64::NAN)
            }
            Distribution::Beta { alpha, beta, .. } => {
                let u = unrescale_to_unit(x, self.bounds());
                StBeta::new(*alpha, *beta).map(|d| d.cdf(u)).unwrap_or(f64::NAN)
            }
            Distribution::Lognormal { mu, sigma, .. } => {
                StLogNormal::new(*mu, *sigma).map(|d| d.cdf(x)).unwrap_or(f64::NAN)
            }
        }
    }

    /// Inverse CDF / quantile function, the Dⱼ⁻¹ of §4.B step 5.
    pub fn quantile(&self, p: f64) -> f64 {
        let p = p.clamp(1e-12, 1.0 - 1e-12);
        match self {
            Distribution::Normal { mean, std, .. } => {
                StNormal::new(*mean, *std).map(|d| d.inverse_cdf(p)).unwrap_or(f64::NAN)
            }
            Distribution::Triangular { min, mode, max, .. } => triangular_quantile(p, *min, *mode, *max),
            Distribution::Uniform { min, max, .. } => min + p * (max - min),
            Distribution::Beta { alpha, beta, .. } => {
                let u = StBeta::new(*alpha, *beta).map(|d| d.inverse_cdf(p)).unwrap_or(f64::NAN);
                rescale_unit_interval(u, self.bounds())
            }
            Distribution::Lognormal { mu, sigma, .. } => {
                StLogNormal::new(*mu, *sigma).map(|d| d.inverse_cdf(p)).unwrap_or(f64::NAN)
            }
        }
    }

    pub fn pdf(&self, x: f64) -> f64 {
        match self {
            Distribution::Normal { mean, std, .. } => {
                StNormal::new(*mean, *std).map(|d| d.pdf(x)).unwrap_or(0.0)
            }
            Distribution::Triangular { min, mode, max, .. } => triangular_pdf(x, *min, *mode, *max),
            Distribution::Uniform { min, max, .. } => {
                if x < *min || x > *max {
                    0.0
                } else {
                    1.0 / (max - min)
                }
            }
            Distribution::Beta { alpha, beta, .. } => {
                let u = unrescale_to_unit(x, self.bounds());
                StBeta::new(*alpha, *beta).map(|d| d.pdf(u)).unwrap_or(0.0)
            }
            Distribution::Lognormal { mu, sigma, .. } => {
                StLogNormal::new(*mu, *sigma).map(|d| d.pdf(x)).unwrap_or(0.0)
            }
        }
    }

    pub fn log_likelihood(&self, data: &[f64]) -> f64 {
        data.iter().map(|&x| self.pdf(x).max(1e-300).ln()).sum()
    }
}

fn rescale_unit_interval(u: f64, bounds: Option<Bounds>) -> f64 {
    match bounds {
        Some(Bounds { lower: Some(lo), upper: Some(hi) }) => lo + u * (hi - lo),
        _ => u,
    }
}

fn unrescale_to_unit(x: f64, bounds: Option<Bounds>) -> f64 {
    match bounds {
        Some(Bounds { lower: Some(lo), upper: Some(hi) }) if hi > lo => ((x - lo) / (hi - lo)).clamp(0.0, 1.0),
        _ => x.clamp(0.0, 1.0),
    }
}

fn sample_triangular<R: Rng + ?Sized>(rng: &mut R, min: f64, mode: f64, max: f64) -> f64 {
    let u: f64 = rng.gen();
    triangular_quantile(u, min, mode, max)
}

fn triangular_cdf(x: f64, min: f64, mode: f64, max: f64) -> f64 {
    if x < min {
        0.0
    } else if x <= mode {
        (x - min).powi(2) / ((max - min) * (mode - min).max(1e-12))
    } else if x <= max {
        1.0 - (max - x).powi(2) / ((max - min) * (max - mode).max(1e-12))
    } else {
        1.0
    }
}

fn triangular_pdf(x: f64, min: f64, mode: f64, max: f64) -> f64 {
    if x < min || x > max {
        0.0
    } else if x < mode {
        2.0 * (x - min) / ((max - min) * (mode - min).max(1e-12))
    } else if x > mode {
        2.0 * (max - x) / ((max - min) * (max - mode).max(1e-12))
    } else {
        2.0 / (max - min)
    }
}

fn triangular_quantile(p: f64, min: f64, mode: f64, max: f64) -> f64 {
    let fc = (mode - min) / (max - min).max(1e-12);
    if p < fc {
        min + (p * (max - min) * (mode - min)).sqrt()
    } else {
        max - ((1.0 - p) * (max - min) * (max - mode)).sqrt()
    }
}

/// Goodness-of-fit diagnostics for one fitted distribution against a sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoodnessOfFit {
    pub ks_statistic: f64,
    pub ks_p_value: f64,
    pub anderson_darling: Option<f64>,
    pub anderson_darling_p_value: Option<f64>,
    pub chi_square_statistic: Option<f64>,
    pub chi_square_p_value: Option<f64>,
    pub quality_score: f64,
}

pub fn kolmogorov_smirnov(dist: &Distribution, data: &[f64]) -> (f64, f64) {
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    let mut d_max = 0.0f64;
    for (i, &x) in sorted.iter().enumerate() {
        let f_empirical_upper = (i as f64 + 1.0) / n as f64;
        let f_empirical_lower = i as f64 / n as f64;
        let f_model = dist.cdf(x);
        d_max = d_max.max((f_empirical_upper - f_model).abs());
        d_max = d_max.max((f_model - f_empirical_lower).abs());
    }
    (d_max, mathutil::ks_p_value(d_max, n))
}

/// Anderson-Darling statistic specialized to the normal family, with a
/// p-value from interpolation across tabulated critical values.
pub fn anderson_darling_normal(mean: f64, std: f64, data: &[f64]) -> (f64, f64) {
    let n = data.len();
    let mut z: Vec<f64> = data.iter().map(|&x| (x - mean) / std).collect();
    z.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let norm = StNormal::new(0.0, 1.0).unwrap();
    let mut s = 0.0;
    for (i, &zi) in z.iter().enumerate() {
        let f_i = norm.cdf(zi).clamp(1e-12, 1.0 - 1e-12);
        let f_ni = norm.cdf(z[n - 1 - i]).clamp(1e-12, 1.0 - 1e-12);
        s += (2.0 * (i as f64 + 1.0) - 1.0) * (f_i.ln() + (1.0 - f_ni).ln());
    }
    let a2 = -(n as f64) - s / n as f64;
    // Small-sample correction for the case of estimated parameters.
    let a2_star = a2 * (1.0 + 4.0 / n as f64 - 25.0 / (n as f64 * n as f64));
    // Tabulated (critical value, significance level) pairs for the corrected statistic.
    const TABLE: [(f64, f64); 6] = [
        (0.201, 0.9),
        (0.284, 0.75),
        (0.348, 0.5),
        (0.474, 0.25),
        (0.656, 0.1),
        (1.035, 0.01),
    ];
    let p = interpolate_p_value(a2_star, &TABLE);
    (a2_star, p)
}

fn interpolate_p_value(stat: f64, table: &[(f64, f64)]) -> f64 {
    if stat <= table[0].0 {
        return table[0].1;
    }
    if stat >= table[table.len() - 1].0 {
        return table[table.len() - 1].1;
    }
    for w in table.windows(2) {
        let (x0, y0) = w[0];
        let (x1, y1) = w[1];
        if stat >= x0 && stat <= x1 {
            let frac = (stat - x0) / (x1 - x0);
            return y0 + frac * (y1 - y0);
        }
    }
    0.01
}

/// Chi-square goodness of fit with bin merging so each expected count >= 5.
pub fn chi_square_test(dist: &Distribution, data: &[f64], estimated_params: usize) -> Option<(f64, f64, usize)> {
    let n = data.len();
    if n < 10 {
        return None;
    }
    let initial_bins = (n as f64).sqrt().ceil().max(5.0) as usize;
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let min = sorted[0];
    let max = sorted[n - 1];
    if (max - min).abs() < 1e-12 {
        return None;
    }
    let mut edges: Vec<f64> = (0..=initial_bins)
        .map(|i| min + (max - min) * i as f64 / initial_bins as f64)
        .collect();
    edges[0] = f64::NEG_INFINITY;
    *edges.last_mut().unwrap() = f64::INFINITY;

    let mut observed = vec![0usize; edges.len() - 1];
    for &x in data {
        let idx = edges.windows(2).position(|w| x >= w[0] && x < w[1]).unwrap_or(observed.len() - 1);
        observed[idx] += 1;
    }
    let mut expected: Vec<f64> = edges
        .windows(2)
        .map(|w| (dist.cdf(w[1]) - dist.cdf(w[0])) * n as f64)
        .collect();

    // Merge adjacent bins until every expected count >= 5.
    loop {
        if expected.len() <= 2 {
            break;
        }
        let merge_idx = expected.iter().position(|&e| e < 5.0);
        match merge_idx {
            None => break,
            Some(i) => {
                let j = if i == expected.len() - 1 { i - 1 } else { i };
                let merged_obs = observed[j] + observed[j + 1];
                let merged_exp = expected[j] + expected[j + 1];
                observed[j] = merged_obs;
                expected[j] = merged_exp;
                observed.remove(j + 1);
                expected.remove(j + 1);
            }
        }
    }
    if expected.iter().any(|&e| e < 1.0) || expected.len() < 2 {
        return None;
    }
    let stat: f64 = observed
        .iter()
        .zip(expected.iter())
        .map(|(&o, &e)| (o as f64 - e).powi(2) / e)
        .sum();
    let dof = (expected.len() as isize - 1 - estimated_params as isize).max(1) as f64;
    let chi2 = statrs::distribution::ChiSquared::new(dof).ok()?;
    let p = chi2.sf(stat);
    Some((stat, p, dof as usize))
}

/// Fit report from §4.A "Fitting historical data": per-family log-likelihood,
/// information criteria and KS diagnostics, with the best family by AIC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitCandidate {
    pub family: DistributionFamily,
    pub distribution: Distribution,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    pub ks_statistic: f64,
    pub ks_p_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitReport {
    pub best: FitCandidate,
    pub candidates: Vec<FitCandidate>,
}

/// MLE-driven fit across all five families, selecting by minimum AIC.
pub fn fit_best(data: &[f64]) -> Result<FitReport> {
    if data.is_empty() {
        return Err(MonteCarloError::validation("historical data", "must be non-empty"));
    }
    let n = data.len() as f64;
    let mut candidates = Vec::new();

    for family in DistributionFamily::all() {
        let fitted = match family {
            DistributionFamily::Lognormal if data.iter().any(|&x| x <= 0.0) => None,
            _ => mle_fit(family, data).ok(),
        };
        if let Some(dist) = fitted {
            let ll = dist.log_likelihood(data);
            if !ll.is_finite() {
                continue;
            }
            let k = family.param_count() as f64;
            let aic = 2.0 * k - 2.0 * ll;
            let bic = n.ln() * k - 2.0 * ll;
            let (ks_stat, ks_p) = kolmogorov_smirnov(&dist, data);
            candidates.push(FitCandidate {
                family,
                distribution: dist,
                log_likelihood: ll,
                aic,
                bic,
                ks_statistic: ks_stat,
                ks_p_value: ks_p,
            });
        }
    }

    if candidates.is_empty() {
        return Err(MonteCarloError::numerical("fit_best", "no candidate family converged"));
    }
    candidates.sort_by(|a, b| a.aic.partial_cmp(&b.aic).unwrap());
    let best = candidates[0].clone();
    Ok(FitReport { best, candidates })
}

fn mle_fit(family: DistributionFamily, data: &[f64]) -> Result<Distribution> {
    match family {
        DistributionFamily::Normal => {
            let mean = mathutil::mean(data);
            let n = data.len() as f64;
            let var = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
            Distribution::normal(mean, var.sqrt().max(1e-9))
        }
        DistributionFamily::Uniform => {
            let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            if (max - min).abs() < 1e-12 {
                let pad = (min.abs().max(1.0)) * 1e-6;
                Distribution::uniform(min - pad, max + pad)
            } else {
                Distribution::uniform(min, max)
            }
        }
        DistributionFamily::Lognormal => {
            let logs: Vec<f64> = data.iter().map(|x| x.ln()).collect();
            let mu = mathutil::mean(&logs);
            let n = logs.len() as f64;
            let var = logs.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / n;
            Distribution::lognormal(mu, var.sqrt().max(1e-6))
        }
        DistributionFamily::Triangular => {
            let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let mode = mathutil::kde_mode(data).clamp(min, max);
            if (max - min).abs() < 1e-12 {
                let pad = (min.abs().max(1.0)) * 1e-6;
                Distribution::triangular(min - pad, mode, max + pad)
            } else {
                Distribution::triangular(min, mode, max)
            }
        }
        DistributionFamily::Beta => mle_fit_beta(data),
    }
}

/// Approximate beta MLE: method-of-moments initial guess refined by a
/// few Newton steps on the digamma-based likelihood equations.
fn mle_fit_beta(data: &[f64]) -> Result<Distribution> {
    let data_min = data.iter().cloned().fold(f64::INFINITY, f64::min);
    let data_max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = (data_max - data_min).max(1e-9);
    let norm: Vec<f64> = data.iter().map(|x| ((x - data_min) / range).clamp(1e-6, 1.0 - 1e-6)).collect();
    let mean = mathutil::mean(&norm);
    let var = mathutil::sample_variance(&norm).max(1e-9);
    let bound = mean * (1.0 - mean);
    let var = if var >= bound { 0.99 * bound } else { var };
    let common = mean * (1.0 - mean) / var - 1.0;
    let mut alpha = (mean * common).max(1e-3);
    let mut beta = ((1.0 - mean) * common).max(1e-3);

    let mean_log_x: f64 = norm.iter().map(|x| x.ln()).sum::<f64>() / norm.len() as f64;
    let mean_log_1mx: f64 = norm.iter().map(|x| (1.0 - x).ln()).sum::<f64>() / norm.len() as f64;

    for _ in 0..5 {
        let psi_ab = mathutil::digamma(alpha + beta);
        let g1 = psi_ab - mathutil::digamma(alpha) + mean_log_x;
        let g2 = psi_ab - mathutil::digamma(beta) + mean_log_1mx;
        let trig_ab = mathutil::trigamma(alpha + beta);
        let h11 = trig_ab - mathutil::trigamma(alpha);
        let h22 = trig_ab - mathutil::trigamma(beta);
        let h12 = trig_ab;
        let det = h11 * h22 - h12 * h12;
        if det.abs() < 1e-12 {
            break;
        }
        let d_alpha = (h22 * g1 - h12 * g2) / det;
        let d_beta = (h11 * g2 - h12 * g1) / det;
        let new_alpha = (alpha - d_alpha).max(1e-3);
        let new_beta = (beta - d_beta).max(1e-3);
        if !new_alpha.is_finite() || !new_beta.is_finite() {
            break;
        }
        alpha = new_alpha;
        beta = new_beta;
    }
    let dist = Distribution::beta(alpha, beta)?;
    Ok(dist.with_bounds(Bounds::new(Some(data_min), Some(data_max))))
}

/// Overall goodness-of-fit quality score: weighted mean of per-test
/// p-values blended 80/20 with a parameter-reasonableness score.
pub fn goodness_of_fit(dist: &Distribution, data: &[f64]) -> GoodnessOfFit {
    let (ks_stat, ks_p) = kolmogorov_smirnov(dist, data);
    let (ad_stat, ad_p) = match dist {
        Distribution::Normal { mean, std, .. } => {
            let (a, p) = anderson_darling_normal(*mean, *std, data);
            (Some(a), Some(p))
        }
        _ => (None, None),
    };
    let chi = chi_square_test(dist, data, dist.family().param_count());
    let (chi_stat, chi_p) = match chi {
        Some((s, p, _)) => (Some(s), Some(p)),
        None => (None, None),
    };

    let mut weight_sum = 0.0;
    let mut weighted_p = 0.0;
    weighted_p += 0.4 * ks_p;
    weight_sum += 0.4;
    if let Some(p) = ad_p {
        weighted_p += 0.3 * p;
        weight_sum += 0.3;
    }
    if let Some(p) = chi_p {
        weighted_p += 0.2 * p;
        weight_sum += 0.2;
    }
    let test_score = if weight_sum > 0.0 { weighted_p / weight_sum } else { ks_p };
    let reasonableness = parameter_reasonableness(dist);
    let quality_score = 0.8 * test_score + 0.2 * reasonableness;

    GoodnessOfFit {
        ks_statistic: ks_stat,
        ks_p_value: ks_p,
        anderson_darling: ad_stat,
        anderson_darling_p_value: ad_p,
        chi_square_statistic: chi_stat,
        chi_square_p_value: chi_p,
        quality_score,
    }
}

fn parameter_reasonableness(dist: &Distribution) -> f64 {
    match dist {
        Distribution::Normal { std, .. } => {
            if *std > 0.0 && std.is_finite() {
                1.0
            } else {
                0.0
            }
        }
        Distribution::Triangular { min, mode, max, .. } => {
            if min <= mode && mode <= max && min < max {
                1.0
            } else {
                0.0
            }
        }
        Distribution::Uniform { min, max, .. } => if min < max { 1.0 } else { 0.0 },
        Distribution::Beta { alpha, beta, .. } => {
            if *alpha > 0.0 && *beta > 0.0 && *alpha < 1000.0 && *beta < 1000.0 {
                1.0
            } else {
                0.5
            }
        }
        Distribution::Lognormal { sigma, .. } => if *sigma > 0.0 && *sigma < 10.0 { 1.0 } else { 0.5 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn triangular_samples_within_bounds() {
        let dist = Distribution::triangular(100.0, 200.0, 500.0).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let samples = dist.sample(&mut rng, 10_000).unwrap();
        assert!(samples.iter().all(|&x| x.is_finite() && x >= 100.0 && x <= 500.0));
    }

    #[test]
    fn normal_clipped_to_bounds() {
        let dist = Distribution::normal(10.0, 2.0)
            .unwrap()
            .with_bounds(Bounds::new(Some(5.0), Some(15.0)));
        let mut rng = StdRng::seed_from_u64(1);
        let samples = dist.sample(&mut rng, 5_000).unwrap();
        assert!(samples.iter().all(|&x| (5.0..=15.0).contains(&x)));
    }

    #[test]
    fn beta_preconditions_rejected() {
        assert!(Distribution::beta(0.0, 1.0).is_err());
        assert!(Distribution::beta(1.0, -1.0).is_err());
    }

    #[test]
    fn triangular_quantile_is_cdf_inverse() {
        let dist = Distribution::triangular(0.0, 3.0, 10.0).unwrap();
        for p in [0.1, 0.3, 0.5, 0.7, 0.9] {
            let x = dist.quantile(p);
            let back = dist.cdf(x);
            assert!((back - p).abs() < 1e-6);
        }
    }

    #[test]
    fn fit_best_recovers_normal_family() {
        let mut rng = StdRng::seed_from_u64(7);
        let truth = Distribution::normal(50.0, 5.0).unwrap();
        let data = truth.sample(&mut rng, 2000).unwrap();
        let report = fit_best(&data).unwrap();
        assert_eq!(report.best.family, DistributionFamily::Normal);
    }
}
