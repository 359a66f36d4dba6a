//! Component B — correlation matrix validation, repair, and correlated
//! sampling via Cholesky decomposition (§4.B).

use crate::distributions::Distribution;
use crate::error::{MonteCarloError, Result};
use nalgebra::{DMatrix, SymmetricEigen};
use rand::Rng;
use rand_distr::{Distribution as RandDistr, StandardNormal};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal as StNormal};
use std::collections::HashMap;

const SYMMETRY_TOL: f64 = 1e-8;
const DIAGONAL_TOL: f64 = 1e-8;
const EIGEN_TOL: f64 = 1e-8;

/// Sparse pair-map plus ordered ID list — the canonical representation
/// per DESIGN.md "Correlation matrix as two views".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub risk_ids: Vec<String>,
    #[serde(with = "pair_map_as_entries")]
    pairs: HashMap<(String, String), f64>,
}

/// Serde adapter serializing the pair-map as a flat entry list, since JSON
/// (and most self-describing formats) cannot key a map by a tuple — matches
/// §6 "arrays are length-prefixed" for the non-scalar-keyed collections.
mod pair_map_as_entries {
    use super::HashMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Entry {
        a: String,
        b: String,
        rho: f64,
    }

    pub fn serialize<S: Serializer>(map: &HashMap<(String, String), f64>, s: S) -> Result<S::Ok, S::Error> {
        let entries: Vec<Entry> = map.iter().map(|((a, b), &rho)| Entry { a: a.clone(), b: b.clone(), rho }).collect();
        entries.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<HashMap<(String, String), f64>, D::Error> {
        let entries = Vec::<Entry>::deserialize(d)?;
        Ok(entries.into_iter().map(|e| ((e.a, e.b), e.rho)).collect())
    }
}

impl CorrelationMatrix {
    pub fn new(risk_ids: Vec<String>) -> Self {
        Self { risk_ids, pairs: HashMap::new() }
    }

    fn key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    pub fn set(&mut self, a: &str, b: &str, rho: f64) -> Result<()> {
        if a == b {
            return Err(MonteCarloError::validation("correlation pair", "self-correlation is implicit"));
        }
        if !(-1.0..=1.0).contains(&rho) {
            return Err(MonteCarloError::validation("correlation coefficient", "must be in [-1, 1]"));
        }
        self.pairs.insert(Self::key(a, b), rho);
        Ok(())
    }

    pub fn get(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        self.pairs.get(&Self::key(a, b)).copied().unwrap_or(0.0)
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&(String, String), &f64)> {
        self.pairs.iter()
    }

    /// Dense symmetric matrix built on demand, ordered by `risk_ids`.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let n = self.risk_ids.len();
        let mut m = DMatrix::<f64>::identity(n, n);
        for i in 0..n {
            for j in (i + 1)..n {
                let rho = self.get(&self.risk_ids[i], &self.risk_ids[j]);
                m[(i, j)] = rho;
                m[(j, i)] = rho;
            }
        }
        m
    }

    pub fn from_dense(risk_ids: Vec<String>, matrix: &DMatrix<f64>) -> Self {
        let mut cm = CorrelationMatrix::new(risk_ids.clone());
        let n = risk_ids.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let _ = cm.set(&risk_ids[i], &risk_ids[j], matrix[(i, j)]);
            }
        }
        cm
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Warning,
    Fatal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixValidation {
    pub is_valid: bool,
    pub min_eigenvalue: f64,
    pub condition_number: f64,
    pub issues: Vec<ValidationIssue>,
}

/// §4.B "Validation" — the six checks, returning warnings and fatal issues.
pub fn validate(cm: &CorrelationMatrix) -> Result<MatrixValidation> {
    let n = cm.risk_ids.len();
    let mut issues = Vec::new();

    for (_, &rho) in cm.pairs() {
        if !(-1.0..=1.0).contains(&rho) {
            issues.push(ValidationIssue {
                severity: IssueSeverity::Fatal,
                message: format!("coefficient {rho} outside [-1, 1]"),
            });
        }
    }

    let dense = cm.to_dense();
    for i in 0..n {
        for j in 0..n {
            if (dense[(i, j)] - dense[(j, i)]).abs() > SYMMETRY_TOL {
                issues.push(ValidationIssue {
                    severity: IssueSeverity::Fatal,
                    message: "matrix is not symmetric".into(),
                });
            }
        }
        if (dense[(i, i)] - 1.0).abs() > DIAGONAL_TOL {
            issues.push(ValidationIssue {
                severity: IssueSeverity::Fatal,
                message: "diagonal is not unit".into(),
            });
        }
    }

    let eigen = SymmetricEigen::new(dense.clone());
    let min_eig = eigen.eigenvalues.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_eig = eigen.eigenvalues.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if min_eig < -EIGEN_TOL {
        issues.push(ValidationIssue {
            severity: IssueSeverity::Fatal,
            message: format!("matrix is not positive semidefinite (min eigenvalue {min_eig})"),
        });
    } else if min_eig < EIGEN_TOL {
        issues.push(ValidationIssue {
            severity: IssueSeverity::Warning,
            message: "matrix is borderline positive semidefinite".into(),
        });
    }

    let condition_number = if min_eig.abs() > 1e-15 { (max_eig / min_eig).abs() } else { f64::INFINITY };
    if condition_number > 1e12 {
        issues.push(ValidationIssue {
            severity: IssueSeverity::Fatal,
            message: format!("condition number {condition_number:.3e} exceeds 1e12"),
        });
    } else if condition_number > 1e6 {
        issues.push(ValidationIssue {
            severity: IssueSeverity::Warning,
            message: format!("condition number {condition_number:.3e} exceeds 1e6"),
        });
    }

    for (_, &rho) in cm.pairs() {
        if rho.abs() >= 0.95 {
            issues.push(ValidationIssue {
                severity: IssueSeverity::Warning,
                message: format!("|correlation| {rho} >= 0.95 — consider merging these risks"),
            });
        }
    }

    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let rho_ab = dense[(i, j)];
                let rho_bc = dense[(j, k)];
                let rho_ac = dense[(i, k)];
                if rho_ab.abs() > 0.5 && rho_bc.abs() > 0.5 {
                    let bound = ((1.0 - rho_ab * rho_ab) * (1.0 - rho_bc * rho_bc)).max(0.0).sqrt();
                    if (rho_ac - rho_ab * rho_bc).abs() > bound {
                        issues.push(ValidationIssue {
                            severity: IssueSeverity::Warning,
                            message: format!(
                                "triangular inequality violated among risks {}, {}, {}",
                                cm.risk_ids[i], cm.risk_ids[j], cm.risk_ids[k]
                            ),
                        });
                    }
                }
            }
        }
    }

    let is_valid = !issues.iter().any(|i| i.severity == IssueSeverity::Fatal);
    Ok(MatrixValidation { is_valid, min_eigenvalue: min_eig, condition_number, issues })
}

/// §4.B "Repair": eigenvalue adjustment, never mutating the input.
pub fn repair(cm: &CorrelationMatrix) -> CorrelationMatrix {
    let dense = cm.to_dense();
    let n = dense.nrows();
    let eigen = SymmetricEigen::new(dense);
    let clamped_values: Vec<f64> = eigen.eigenvalues.iter().map(|&v| v.max(EIGEN_TOL)).collect();
    let clamped = nalgebra::DMatrix::from_diagonal(&nalgebra::DVector::from_vec(clamped_values));
    let mut reconstructed = &eigen.eigenvectors * clamped * eigen.eigenvectors.transpose();

    for i in 0..n {
        reconstructed[(i, i)] = 1.0;
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = (reconstructed[(i, j)] + reconstructed[(j, i)]) / 2.0;
            let clipped = avg.clamp(-1.0, 1.0);
            reconstructed[(i, j)] = clipped;
            reconstructed[(j, i)] = clipped;
        }
    }
    CorrelationMatrix::from_dense(cm.risk_ids.clone(), &reconstructed)
}

/// Cholesky factor of the dense correlation matrix, or a numerical failure
/// if the (validated-tolerance) matrix is near-singular.
pub fn cholesky(cm: &CorrelationMatrix) -> Result<DMatrix<f64>> {
    let dense = cm.to_dense();
    nalgebra::Cholesky::new(dense)
        .map(|c| c.l())
        .ok_or_else(|| MonteCarloError::numerical("cholesky", "matrix is not positive definite"))
}

/// §4.B "Correlated sampling": draw `m` correlated samples for the ordered
/// distributions `dists`, preserving each marginal exactly.
pub fn correlated_sample<R: Rng + ?Sized>(
    dists: &[Distribution],
    l: &DMatrix<f64>,
    m: usize,
    rng: &mut R,
) -> Result<DMatrix<f64>> {
    let n = dists.len();
    if l.nrows() != n || l.ncols() != n {
        return Err(MonteCarloError::validation(
            "correlated_sample",
            "cholesky factor dimension mismatch with distribution count",
        ));
    }
    let mut z = DMatrix::<f64>::zeros(m, n);
    for i in 0..m {
        for j in 0..n {
            z[(i, j)] = StandardNormal.sample(rng);
        }
    }
    let y = &z * l.transpose();
    let normal01 = StNormal::new(0.0, 1.0).unwrap();
    let mut out = DMatrix::<f64>::zeros(m, n);
    for i in 0..m {
        for j in 0..n {
            let u = normal01.cdf(y[(i, j)]);
            out[(i, j)] = dists[j].quantile(u);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn two_risk_matrix(rho: f64) -> CorrelationMatrix {
        let mut cm = CorrelationMatrix::new(vec!["A".into(), "B".into()]);
        cm.set("A", "B", rho).unwrap();
        cm
    }

    #[test]
    fn valid_matrix_passes() {
        let cm = two_risk_matrix(0.5);
        let v = validate(&cm).unwrap();
        assert!(v.is_valid);
    }

    #[test]
    fn non_psd_matrix_is_repaired_idempotently() {
        let mut cm = CorrelationMatrix::new(vec!["A".into(), "B".into(), "C".into()]);
        cm.set("A", "B", 0.9).unwrap();
        cm.set("B", "C", 0.9).unwrap();
        cm.set("A", "C", -0.9).unwrap();
        let v = validate(&cm).unwrap();
        assert!(!v.is_valid);
        let repaired = repair(&cm);
        let v2 = validate(&repaired).unwrap();
        assert!(v2.is_valid);
        let repaired_again = repair(&repaired);
        let dense1 = repaired.to_dense();
        let dense2 = repaired_again.to_dense();
        assert!((dense1 - dense2).abs().max() < 1e-6);
    }

    #[test]
    fn correlation_induction_close_to_target() {
        let cm = two_risk_matrix(0.9);
        let l = cholesky(&cm).unwrap();
        let dists = vec![Distribution::normal(0.0, 1.0).unwrap(), Distribution::normal(0.0, 1.0).unwrap()];
        let mut rng = StdRng::seed_from_u64(7);
        let samples = correlated_sample(&dists, &l, 50_000, &mut rng).unwrap();
        let col0: Vec<f64> = (0..samples.nrows()).map(|i| samples[(i, 0)]).collect();
        let col1: Vec<f64> = (0..samples.nrows()).map(|i| samples[(i, 1)]).collect();
        let empirical = crate::mathutil::pearson_correlation(&col0, &col1);
        assert!((empirical - 0.9).abs() < 0.02, "empirical correlation {empirical}");
    }
}
