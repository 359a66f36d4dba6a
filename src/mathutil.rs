//! Small numerical helpers that back the distribution-fitting and
//! goodness-of-fit machinery. These are core algorithm pieces (digamma,
//! the Kolmogorov asymptotic p-value, KDE mode estimation), not ambient
//! concerns the corpus already ships a crate for — `statrs` covers the
//! standard CDFs/PDFs elsewhere in this crate, but none of the pack
//! depends on a digamma or Kolmogorov-distribution crate.

/// Digamma function via the standard asymptotic (Stirling) series, shifted
/// up by the recurrence ψ(x) = ψ(x+1) - 1/x until the argument is large
/// enough for the series to be accurate.
pub fn digamma(mut x: f64) -> f64 {
    let mut result = 0.0;
    while x < 6.0 {
        result -= 1.0 / x;
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    result += x.ln() - 0.5 * inv
        - inv2 * (1.0 / 12.0 - inv2 * (1.0 / 120.0 - inv2 / 252.0));
    result
}

/// Trigamma function (derivative of digamma), same shift-and-series approach.
pub fn trigamma(mut x: f64) -> f64 {
    let mut result = 0.0;
    while x < 6.0 {
        result += 1.0 / (x * x);
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    result += inv + inv2 / 2.0 + inv2 * inv * (1.0 / 6.0 - inv2 * (1.0 / 30.0 - inv2 / 42.0));
    result
}

/// Kolmogorov distribution survival function via the Marsaglia/Kolmogorov
/// asymptotic series, used to turn a KS statistic into a p-value.
pub fn kolmogorov_sf(lambda: f64) -> f64 {
    if lambda < 0.2 {
        return 1.0;
    }
    let mut sum = 0.0;
    for k in 1..=100 {
        let kf = k as f64;
        let term = (-1.0f64).powi(k - 1) * (-2.0 * kf * kf * lambda * lambda).exp();
        sum += term;
        if term.abs() < 1e-12 {
            break;
        }
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

/// KS p-value from statistic `d` over `n` samples against a fully specified CDF.
pub fn ks_p_value(d: f64, n: usize) -> f64 {
    let sqrt_n = (n as f64).sqrt();
    let lambda = (sqrt_n + 0.12 + 0.11 / sqrt_n) * d;
    kolmogorov_sf(lambda)
}

/// Sample mean.
pub fn mean(data: &[f64]) -> f64 {
    data.iter().sum::<f64>() / data.len() as f64
}

/// Bessel-corrected (n-1) sample variance.
pub fn sample_variance(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() as f64 - 1.0)
}

pub fn sample_std(data: &[f64]) -> f64 {
    sample_variance(data).sqrt()
}

pub fn median(data: &[f64]) -> f64 {
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0) * (sorted.len() as f64 - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

/// Skewness (Fisher-Pearson, not bias-corrected — adequate for descriptive reporting).
pub fn skewness(data: &[f64]) -> f64 {
    let m = mean(data);
    let s = sample_std(data).max(1e-12);
    let n = data.len() as f64;
    data.iter().map(|x| ((x - m) / s).powi(3)).sum::<f64>() / n
}

/// Excess kurtosis.
pub fn kurtosis(data: &[f64]) -> f64 {
    let m = mean(data);
    let s = sample_std(data).max(1e-12);
    let n = data.len() as f64;
    data.iter().map(|x| ((x - m) / s).powi(4)).sum::<f64>() / n - 3.0
}

/// Gaussian-kernel density estimate evaluated on a grid, returning the
/// argmax (mode estimate) — used for triangular-distribution fitting.
/// Falls back to the sample median when the data is (near-)constant.
pub fn kde_mode(data: &[f64]) -> f64 {
    let n = data.len();
    if n == 0 {
        return 0.0;
    }
    let std = sample_std(data);
    if std < 1e-9 {
        return median(data);
    }
    // Silverman's rule of thumb bandwidth.
    let bandwidth = 1.06 * std * (n as f64).powf(-0.2);
    let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let grid_points = 200;
    let mut best_x = median(data);
    let mut best_density = f64::NEG_INFINITY;
    for i in 0..=grid_points {
        let x = min + (max - min) * (i as f64) / (grid_points as f64);
        let density: f64 = data
            .iter()
            .map(|xi| {
                let u = (x - xi) / bandwidth;
                (-0.5 * u * u).exp()
            })
            .sum();
        if density > best_density {
            best_density = density;
            best_x = x;
        }
    }
    best_x
}

/// Pearson correlation coefficient.
pub fn pearson_correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let ma = mean(&a[..n]);
    let mb = mean(&b[..n]);
    let mut num = 0.0;
    let mut da = 0.0;
    let mut db = 0.0;
    for i in 0..n {
        let xa = a[i] - ma;
        let xb = b[i] - mb;
        num += xa * xb;
        da += xa * xa;
        db += xb * xb;
    }
    if da <= 0.0 || db <= 0.0 {
        0.0
    } else {
        num / (da.sqrt() * db.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn digamma_matches_known_value() {
        // psi(1) = -gamma (Euler-Mascheroni constant)
        assert_abs_diff_eq!(digamma(1.0), -0.5772156649, epsilon = 1e-6);
    }

    #[test]
    fn percentile_matches_median() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        assert_abs_diff_eq!(percentile(&data, 50.0), 2.5, epsilon = 1e-9);
    }

    #[test]
    fn kolmogorov_sf_decreases_with_lambda() {
        assert!(kolmogorov_sf(0.5) > kolmogorov_sf(1.5));
    }
}
