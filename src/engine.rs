//! Component E — the simulation engine (§4.E). Owns the iteration loop,
//! the correlation double-counting adjustment, the schedule overlay, the
//! convergence tracker, and the engine-level cache/active-simulation
//! state shared across concurrent callers (§5).

use crate::correlation::{self, CorrelationMatrix};
use crate::distributions::Distribution;
use crate::error::{MonteCarloError, Result};
use crate::escalation::EscalationModel;
use crate::mathutil;
use crate::model::{self, Risk, SimulationResults};
use crate::schedule::{CpmResult, ScheduleData, ScheduleGraph};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution as RandDistrTrait, Normal};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const CHUNK_SIZE: u64 = 1_000;
const STABILITY_WINDOW: usize = 10;
const STABILITY_THRESHOLD: f64 = 0.95;
const TRACKED_PERCENTILES: [f64; 3] = [10.0, 50.0, 90.0];
const ESCALATION_SEED_TAG: u64 = 0xE5CA_1A7E_D00D_F00D;

/// A shared, atomically-flipped stop signal (DESIGN.md "Cancellation as
/// explicit token"). Checked at every chunk boundary.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<std::sync::atomic::AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(std::sync::atomic::AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub simulation_id: String,
    pub current_iteration: u64,
    pub total_iterations: u64,
    pub elapsed: Duration,
    pub estimated_remaining: Duration,
    pub status: SimulationStatus,
}

pub type ProgressCallback = Box<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Schedule data bundled with its dependency graph, so the engine can
/// compute CPM once per run and reuse it across every iteration's overlay.
pub struct ScheduleInput<'a> {
    pub graph: &'a ScheduleGraph,
    pub data: &'a ScheduleData,
}

struct ScheduleOverlayCtx<'a> {
    cpm: &'a CpmResult,
    data: &'a ScheduleData,
}

struct ActiveEntry {
    token: CancellationToken,
}

/// Engine-level shared state: the parameter-fingerprint result cache and
/// the active-simulation map (§5 "protected by a single exclusion
/// mechanism... a fine-grained map suffices").
pub struct SimulationEngine {
    result_cache: moka::sync::Cache<String, Arc<SimulationResults>>,
    active: RwLock<HashMap<String, ActiveEntry>>,
}

impl SimulationEngine {
    pub fn new(cache_size_limit: u64) -> Self {
        Self { result_cache: moka::sync::Cache::new(cache_size_limit), active: RwLock::new(HashMap::new()) }
    }

    pub fn active_simulations(&self) -> Vec<String> {
        self.active.read().unwrap().keys().cloned().collect()
    }

    /// Flips the cancellation token for a running simulation. A no-op
    /// target is a domain failure: the caller asked to cancel work that
    /// is not (or is no longer) running.
    pub fn cancel(&self, simulation_id: &str) -> Result<()> {
        match self.active.read().unwrap().get(simulation_id) {
            Some(entry) => {
                entry.token.cancel();
                Ok(())
            }
            None => Err(MonteCarloError::domain(format!("no active simulation '{simulation_id}'"))),
        }
    }

    pub fn invalidate_cache_by_risk_id(&self, risk_id: &str) {
        let id = risk_id.to_string();
        let _ = self
            .result_cache
            .invalidate_entries_if(move |_, v: &Arc<SimulationResults>| v.risk_contributions.contains_key(&id));
    }

    /// §4.E `run`.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        simulation_id: impl Into<String>,
        risks: &[Risk],
        iterations: u64,
        correlations: Option<&CorrelationMatrix>,
        seed: Option<u32>,
        progress: Option<&ProgressCallback>,
        baseline_costs: Option<&HashMap<String, f64>>,
        schedule: Option<&ScheduleInput>,
    ) -> Result<SimulationResults> {
        let simulation_id = simulation_id.into();
        if iterations < 10_000 {
            return Err(MonteCarloError::validation("iterations", "must be >= 10 000"));
        }
        model::validate_risks(risks)?;
        if let Some(corr) = correlations {
            for id in &corr.risk_ids {
                if !risks.iter().any(|r| &r.id == id) {
                    return Err(MonteCarloError::validation("correlations", format!("references unknown risk id '{id}'")));
                }
            }
        }

        let token = CancellationToken::new();
        self.active.write().unwrap().insert(simulation_id.clone(), ActiveEntry { token: token.clone() });
        info!(simulation_id = %simulation_id, iterations, "simulation started");

        let start = Instant::now();
        let outcome = self.execute(&simulation_id, risks, iterations, correlations, seed, progress, baseline_costs, schedule, &token, start);

        // Active-simulation tracking is cleaned up on every exit path.
        self.active.write().unwrap().remove(&simulation_id);
        match &outcome {
            Ok(r) => info!(simulation_id = %simulation_id, wall_time = ?r.wall_time, "simulation completed"),
            Err(e) => warn!(simulation_id = %simulation_id, error = %e, "simulation did not complete"),
        }

        if let Some(cb) = progress {
            let status = match &outcome {
                Ok(_) => SimulationStatus::Completed,
                Err(MonteCarloError::Cancelled { .. }) => SimulationStatus::Cancelled,
                Err(_) => SimulationStatus::Failed,
            };
            cb(ProgressUpdate {
                simulation_id: simulation_id.clone(),
                current_iteration: iterations,
                total_iterations: iterations,
                elapsed: start.elapsed(),
                estimated_remaining: Duration::default(),
                status,
            });
        }

        outcome
    }

    /// §4.E `run_with_cache`. The returned `Arc` is the identical
    /// allocation across calls whose fingerprint matches (§8 item 9).
    #[allow(clippy::too_many_arguments)]
    pub fn run_with_cache(
        &self,
        simulation_id: impl Into<String>,
        risks: &[Risk],
        iterations: u64,
        correlations: Option<&CorrelationMatrix>,
        seed: Option<u32>,
        progress: Option<&ProgressCallback>,
        baseline_costs: Option<&HashMap<String, f64>>,
        schedule: Option<&ScheduleInput>,
    ) -> Result<Arc<SimulationResults>> {
        let fingerprint = parameter_fingerprint(risks, iterations, seed, baseline_costs, schedule.map(|s| s.data), correlations);
        if let Some(cached) = self.result_cache.get(&fingerprint) {
            return Ok(cached);
        }
        let result = Arc::new(self.run(simulation_id, risks, iterations, correlations, seed, progress, baseline_costs, schedule)?);
        self.result_cache.insert(fingerprint, result.clone());
        Ok(result)
    }

    /// §4.E `run_with_escalation`: base simulation, then every cost
    /// outcome is mapped through the escalation modeler with its own
    /// sampled rates, on an RNG stream independent of the base run.
    #[allow(clippy::too_many_arguments)]
    pub fn run_with_escalation(
        &self,
        simulation_id: impl Into<String>,
        risks: &[Risk],
        iterations: u64,
        correlations: Option<&CorrelationMatrix>,
        seed: Option<u32>,
        progress: Option<&ProgressCallback>,
        baseline_costs: &HashMap<String, f64>,
        schedule: Option<&ScheduleInput>,
        escalation_model: &EscalationModel,
        category_breakdown: Option<&HashMap<String, f64>>,
        project_start: chrono::DateTime<chrono::Utc>,
        project_end: chrono::DateTime<chrono::Utc>,
    ) -> Result<SimulationResults> {
        let mut result = self.run(simulation_id, risks, iterations, correlations, seed, progress, Some(baseline_costs), schedule)?;
        let years = (project_end - project_start).num_days() as f64 / 365.25;
        let base_seed = seed.map(|s| s as u64).unwrap_or_else(|| rand::thread_rng().gen());
        for (i, cost) in result.cost_outcomes.iter_mut().enumerate() {
            let derived = derive_seed(base_seed ^ ESCALATION_SEED_TAG, i as u64);
            let mut rng = StdRng::seed_from_u64(derived);
            let escalated = crate::escalation::apply_escalation(escalation_model, *cost, category_breakdown, years, &mut rng)?;
            *cost = escalated.escalated_cost;
        }
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        simulation_id: &str,
        risks: &[Risk],
        iterations: u64,
        correlations: Option<&CorrelationMatrix>,
        seed: Option<u32>,
        progress: Option<&ProgressCallback>,
        baseline_costs: Option<&HashMap<String, f64>>,
        schedule: Option<&ScheduleInput>,
        token: &CancellationToken,
        start: Instant,
    ) -> Result<SimulationResults> {
        let base_seed = seed.map(|s| s as u64).unwrap_or_else(|| rand::thread_rng().gen());
        let sum_baseline: f64 = baseline_costs.map(|m| m.values().sum()).unwrap_or(0.0);
        let floor = 0.1 * sum_baseline;

        let cholesky = match correlations {
            Some(cm) => match correlation::cholesky(cm) {
                Ok(l) => Some(l),
                Err(e) => {
                    warn!(simulation_id, error = %e, "cholesky factorization failed, falling back to independent sampling");
                    None
                }
            },
            None => None,
        };
        let corr_dists: Vec<Distribution> = match correlations {
            Some(cm) => cm
                .risk_ids
                .iter()
                .map(|id| risks.iter().find(|r| &r.id == id).unwrap().distribution.clone())
                .collect(),
            None => Vec::new(),
        };

        let cpm = match schedule {
            Some(s) => Some(s.graph.compute()?),
            None => None,
        };
        let overlay_ctx = schedule.zip(cpm.as_ref()).map(|(s, cpm)| ScheduleOverlayCtx { cpm, data: s.data });

        let mut cost_outcomes = Vec::with_capacity(iterations as usize);
        let mut schedule_outcomes = Vec::with_capacity(iterations as usize);
        let mut risk_rows: HashMap<String, Vec<f64>> =
            risks.iter().map(|r| (r.id.clone(), Vec::with_capacity(iterations as usize))).collect();

        let mut checkpoint_iters: Vec<u64> = Vec::new();
        let mut checkpoint_cost_means: Vec<f64> = Vec::new();
        let mut checkpoint_cost_vars: Vec<f64> = Vec::new();
        let mut checkpoint_sched_means: Vec<f64> = Vec::new();
        let mut checkpoint_sched_vars: Vec<f64> = Vec::new();
        let mut checkpoint_pct: HashMap<u32, Vec<f64>> =
            TRACKED_PERCENTILES.iter().map(|&p| (p as u32, Vec::new())).collect();

        let mut cursor = 0u64;
        while cursor < iterations {
            if token.is_cancelled() {
                return Err(MonteCarloError::Cancelled { last_completed_iteration: cursor });
            }
            let end = (cursor + CHUNK_SIZE).min(iterations);

            use rayon::prelude::*;
            let rows: Vec<IterationRow> = (cursor..end)
                .into_par_iter()
                .map(|i| {
                    compute_iteration(
                        i,
                        risks,
                        correlations,
                        cholesky.as_ref(),
                        &corr_dists,
                        base_seed,
                        sum_baseline,
                        floor,
                        overlay_ctx.as_ref(),
                    )
                })
                .collect::<Result<Vec<_>>>()?;

            for row in rows {
                cost_outcomes.push(row.cost);
                schedule_outcomes.push(row.schedule);
                for (id, v) in row.per_risk {
                    risk_rows.get_mut(&id).unwrap().push(v);
                }
            }

            checkpoint_iters.push(end);
            checkpoint_cost_means.push(mathutil::mean(&cost_outcomes));
            checkpoint_cost_vars.push(mathutil::sample_variance(&cost_outcomes));
            checkpoint_sched_means.push(mathutil::mean(&schedule_outcomes));
            checkpoint_sched_vars.push(mathutil::sample_variance(&schedule_outcomes));
            let mut sorted_cost = cost_outcomes.clone();
            sorted_cost.sort_by(|a, b| a.partial_cmp(b).unwrap());
            for &p in &TRACKED_PERCENTILES {
                checkpoint_pct.get_mut(&(p as u32)).unwrap().push(mathutil::percentile(&sorted_cost, p));
            }

            if let Some(cb) = progress {
                let elapsed = start.elapsed();
                let estimated_remaining = if end > 0 {
                    elapsed.mul_f64((iterations - end) as f64 / end as f64)
                } else {
                    Duration::default()
                };
                cb(ProgressUpdate {
                    simulation_id: simulation_id.to_string(),
                    current_iteration: end,
                    total_iterations: iterations,
                    elapsed,
                    estimated_remaining,
                    status: SimulationStatus::Running,
                });
            }

            cursor = end;
        }

        let convergence = build_convergence_metrics(
            &checkpoint_iters,
            &checkpoint_cost_means,
            &checkpoint_cost_vars,
            &checkpoint_sched_means,
            &checkpoint_sched_vars,
            &checkpoint_pct,
        );

        Ok(SimulationResults {
            simulation_id: simulation_id.to_string(),
            timestamp: chrono::Utc::now(),
            iterations,
            cost_outcomes,
            schedule_outcomes,
            risk_contributions: risk_rows,
            convergence,
            wall_time: start.elapsed(),
        })
    }
}

struct IterationRow {
    cost: f64,
    schedule: f64,
    per_risk: Vec<(String, f64)>,
}

#[allow(clippy::too_many_arguments)]
fn compute_iteration(
    global_index: u64,
    risks: &[Risk],
    correlations: Option<&CorrelationMatrix>,
    cholesky: Option<&DMatrix<f64>>,
    corr_dists: &[Distribution],
    base_seed: u64,
    sum_baseline: f64,
    floor: f64,
    overlay_ctx: Option<&ScheduleOverlayCtx>,
) -> Result<IterationRow> {
    let derived = derive_seed(base_seed, global_index);
    let mut rng = StdRng::seed_from_u64(derived);

    let mut samples = vec![0.0; risks.len()];
    match (correlations, cholesky) {
        (Some(corr), Some(l)) => {
            let corr_sample = correlation::correlated_sample(corr_dists, l, 1, &mut rng)?;
            for (i, risk) in risks.iter().enumerate() {
                match corr.risk_ids.iter().position(|id| id == &risk.id) {
                    Some(j) => samples[i] = corr_sample[(0, j)],
                    None => samples[i] = risk.distribution.sample_one(&mut rng)?,
                }
            }
        }
        _ => {
            // Either no correlations were supplied, or the Cholesky factor
            // failed to precompute — fall back to independent sampling.
            for (i, risk) in risks.iter().enumerate() {
                samples[i] = risk.distribution.sample_one(&mut rng)?;
            }
        }
    }

    let mut cost_accum = 0.0;
    let mut schedule_accum = 0.0;
    let mut per_risk = Vec::with_capacity(risks.len());

    for (i, risk) in risks.iter().enumerate() {
        let raw_impact = samples[i] * risk.baseline_impact;
        if !raw_impact.is_finite() {
            return Err(MonteCarloError::numerical("iteration impact", format!("non-finite impact for risk '{}'", risk.id)));
        }
        let mut corr_sum = 0.0;
        if let Some(corr) = correlations {
            for other in risks.iter().take(i) {
                corr_sum += corr.get(&risk.id, &other.id).abs();
            }
        }
        let factor = (1.0 - corr_sum * 0.1).max(0.5);
        let adjusted = raw_impact * factor;

        if risk.impact_type.affects_cost() {
            cost_accum += adjusted;
        }
        if risk.impact_type.affects_schedule() {
            schedule_accum += adjusted;
        }
        per_risk.push((risk.id.clone(), adjusted));
    }

    let schedule_final = match overlay_ctx {
        Some(ctx) => apply_schedule_overlay(schedule_accum, ctx, &mut rng),
        None => schedule_accum,
    };
    let cost_final = (sum_baseline + cost_accum).max(floor);

    Ok(IterationRow { cost: cost_final, schedule: schedule_final, per_risk })
}

/// §4.E "Schedule overlay".
fn apply_schedule_overlay<R: Rng + ?Sized>(schedule_accumulator: f64, ctx: &ScheduleOverlayCtx, rng: &mut R) -> f64 {
    let total_items = (ctx.cpm.tasks.len() as f64).max(1.0);
    let critical_items = ctx.cpm.tasks.values().filter(|t| t.is_critical).count() as f64;
    let multiplier_noise = Normal::new(0.0, 0.05).unwrap().sample(rng);
    let critical_multiplier = (1.5 + (critical_items / total_items) + multiplier_noise).max(1.0);

    let project_duration = ctx.cpm.project_duration.max(1.0);

    let mut milestone_term = 0.0;
    for m in &ctx.data.milestones {
        let variance = (m.baseline_duration / project_duration) * 0.5;
        let draw = Normal::new(0.0, variance.max(0.0).sqrt().max(1e-9)).unwrap().sample(rng);
        let mut term = draw * (1.0 + 0.1 * m.dependency_ids.len() as f64);
        if m.is_critical_path {
            term *= 1.5;
        }
        milestone_term += term;
    }

    let mut activity_term = 0.0;
    for a in &ctx.data.activities {
        let variance = (a.baseline_duration / project_duration) * 0.3;
        let draw = Normal::new(0.0, variance.max(0.0).sqrt().max(1e-9)).unwrap().sample(rng);
        if a.is_critical_path {
            activity_term += draw * 1.2;
        } else {
            let risk_absorption = (a.float_time / a.baseline_duration.max(1e-9)).min(0.8);
            activity_term += draw * (1.0 - risk_absorption);
        }
    }

    let n_activities = ctx.data.activities.len() as f64;
    let project_component = Normal::new(0.0, 0.1_f64.sqrt()).unwrap().sample(rng) * n_activities * 0.1;

    let mut resource_term = 0.0;
    for resource in ctx.data.resources.values() {
        let demands = ctx.data.activity_demands(&resource.id);
        resource_term += crate::schedule::resources::resource_impact(resource, &demands, schedule_accumulator, rng);
    }

    let combined = schedule_accumulator * critical_multiplier + milestone_term + activity_term + project_component + resource_term;
    combined.max(0.0)
}

fn build_convergence_metrics(
    checkpoint_iters: &[u64],
    cost_means: &[f64],
    cost_vars: &[f64],
    sched_means: &[f64],
    sched_vars: &[f64],
    pct: &HashMap<u32, Vec<f64>>,
) -> crate::model::ConvergenceMetrics {
    let mean_stability = windowed_stability(cost_means);
    let variance_stability = windowed_stability(cost_vars);
    let _ = sched_means;
    let _ = sched_vars;
    let percentile_stability: HashMap<u32, f64> = pct.iter().map(|(&p, v)| (p, windowed_stability(v))).collect();

    let mut iterations_to_convergence = None;
    for idx in 0..checkpoint_iters.len() {
        let m = windowed_stability(&cost_means[..=idx]);
        let v = windowed_stability(&cost_vars[..=idx]);
        let all_pct_ok = pct.values().all(|series| windowed_stability(&series[..=idx]) > STABILITY_THRESHOLD);
        if m > STABILITY_THRESHOLD && v > STABILITY_THRESHOLD && all_pct_ok {
            iterations_to_convergence = Some(checkpoint_iters[idx]);
            break;
        }
    }

    let converged = mean_stability > STABILITY_THRESHOLD
        && variance_stability > STABILITY_THRESHOLD
        && percentile_stability.values().all(|&s| s > STABILITY_THRESHOLD);

    crate::model::ConvergenceMetrics { mean_stability, variance_stability, percentile_stability, converged, iterations_to_convergence }
}

/// Stability of the trailing window (at most the last 10 checkpoints):
/// `1 - min(1, coefficient_of_variation)`.
fn windowed_stability(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let window = &values[values.len().saturating_sub(STABILITY_WINDOW)..];
    let mean = mathutil::mean(window);
    let std = mathutil::sample_std(window);
    let cv = if mean.abs() > 1e-12 { std / mean.abs() } else if std < 1e-12 { 0.0 } else { 1.0 };
    1.0 - cv.min(1.0)
}

fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Deterministic per-iteration seed, a pure function of `(base_seed,
/// global_index)` so that parallel chunking never changes the result
/// (§5 "reproducible for a given seed and chunk count").
fn derive_seed(base_seed: u64, global_index: u64) -> u64 {
    splitmix64(base_seed ^ splitmix64(global_index))
}

/// §4.E "Parameter fingerprint": canonicalized serialization of the
/// simulation's inputs, hashed with SHA-256.
pub fn parameter_fingerprint(
    risks: &[Risk],
    iterations: u64,
    seed: Option<u32>,
    baseline_costs: Option<&HashMap<String, f64>>,
    schedule: Option<&ScheduleData>,
    correlations: Option<&CorrelationMatrix>,
) -> String {
    let mut buf = String::new();
    buf.push_str(&format!("iterations={iterations};seed={seed:?};"));

    if let Some(costs) = baseline_costs {
        let mut keys: Vec<&String> = costs.keys().collect();
        keys.sort();
        for k in keys {
            buf.push_str(&format!("cost:{k}={};", costs[k]));
        }
    }

    let mut sorted_risks: Vec<&Risk> = risks.iter().collect();
    sorted_risks.sort_by(|a, b| a.id.cmp(&b.id));
    for r in sorted_risks {
        buf.push_str(&format!(
            "risk:{}:baseline={}:dist={:?}:bounds={:?};",
            r.id,
            r.baseline_impact,
            r.distribution.family(),
            r.distribution.bounds()
        ));
    }

    if let Some(schedule) = schedule {
        let mut ids: Vec<&str> = schedule.activities.iter().map(|a| a.id.as_str()).collect();
        ids.sort();
        for id in ids {
            buf.push_str(&format!("activity:{id};"));
        }
    }

    if let Some(corr) = correlations {
        let mut pairs: Vec<(&(String, String), &f64)> = corr.pairs().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        for (k, v) in pairs {
            buf.push_str(&format!("corr:{}:{}={v};", k.0, k.1));
        }
    }

    let mut hasher = Sha256::new();
    hasher.update(buf.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImpactType, RiskCategory};

    fn risk(id: &str, dist: Distribution, baseline: f64, impact: ImpactType) -> Risk {
        Risk::new(id, id, RiskCategory::Cost, impact, dist, baseline).unwrap()
    }

    #[test]
    fn e1_single_triangular_risk_matches_expected_band() {
        let engine = SimulationEngine::new(10);
        let risks = vec![risk("r1", Distribution::triangular(100.0, 200.0, 500.0).unwrap(), 1.0, ImpactType::Cost)];
        let mut costs = HashMap::new();
        costs.insert("A".to_string(), 1000.0);
        let result = engine.run("e1", &risks, 10_000, None, Some(42), None, Some(&costs), None).unwrap();

        for &c in &result.cost_outcomes {
            assert!((1099.99..=1500.01).contains(&c), "cost {c} outside expected band");
        }
        let mean = mathutil::mean(&result.cost_outcomes);
        assert!((mean - 1266.7).abs() < 15.0, "mean {mean} not close to 1266.7");
        let mut sorted = result.cost_outcomes.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let p50 = mathutil::percentile(&sorted, 50.0);
        assert!((p50 - 1236.0).abs() < 20.0, "p50 {p50} not close to 1236");
    }

    #[test]
    fn e2_correlated_normal_risks_induce_target_correlation() {
        let engine = SimulationEngine::new(10);
        let risks = vec![
            risk("r1", Distribution::normal(10.0, 2.0).unwrap(), 1.0, ImpactType::Cost),
            risk("r2", Distribution::normal(10.0, 2.0).unwrap(), 1.0, ImpactType::Cost),
        ];
        let mut corr = CorrelationMatrix::new(vec!["r1".to_string(), "r2".to_string()]);
        corr.set("r1", "r2", 0.9).unwrap();
        let result = engine.run("e2", &risks, 20_000, Some(&corr), Some(7), None, None, None).unwrap();

        let row1 = &result.risk_contributions["r1"];
        let row2 = &result.risk_contributions["r2"];
        let empirical = mathutil::pearson_correlation(row1, row2);
        assert!((empirical - 0.9).abs() < 0.02, "empirical correlation {empirical}");
    }

    #[test]
    fn same_seed_is_bit_identical_across_runs() {
        let engine = SimulationEngine::new(10);
        let risks = vec![risk("r1", Distribution::triangular(100.0, 200.0, 500.0).unwrap(), 1.0, ImpactType::Cost)];
        let mut costs = HashMap::new();
        costs.insert("A".to_string(), 1000.0);
        let a = engine.run("a", &risks, 10_000, None, Some(99), None, Some(&costs), None).unwrap();
        let b = engine.run("b", &risks, 10_000, None, Some(99), None, Some(&costs), None).unwrap();
        assert_eq!(a.cost_outcomes, b.cost_outcomes);
    }

    #[test]
    fn run_below_minimum_iterations_is_rejected() {
        let engine = SimulationEngine::new(10);
        let risks = vec![risk("r1", Distribution::normal(1.0, 0.1).unwrap(), 1.0, ImpactType::Cost)];
        assert!(engine.run("x", &risks, 100, None, Some(1), None, None, None).is_err());
    }

    #[test]
    fn cache_hit_returns_identical_arc_and_mutation_changes_fingerprint() {
        let engine = SimulationEngine::new(10);
        let risks = vec![risk("r1", Distribution::normal(10.0, 2.0).unwrap(), 1.0, ImpactType::Cost)];
        let first = engine.run_with_cache("c1", &risks, 10_000, None, Some(5), None, None, None).unwrap();
        let second = engine.run_with_cache("c2", &risks, 10_000, None, Some(5), None, None, None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let mut mutated = risks;
        mutated[0].baseline_impact = 2.0;
        let third = engine.run_with_cache("c3", &mutated, 10_000, None, Some(5), None, None, None).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn cancel_from_another_thread_stops_the_run() {
        let engine = Arc::new(SimulationEngine::new(10));
        let risks = vec![risk("r1", Distribution::normal(1.0, 0.1).unwrap(), 1.0, ImpactType::Cost)];

        let engine2 = engine.clone();
        let risks2 = risks.clone();
        let handle = std::thread::spawn(move || engine2.run("longrun", &risks2, 1_000_000, None, Some(1), None, None, None));

        while !engine.active_simulations().iter().any(|id| id == "longrun") {
            std::thread::yield_now();
        }
        engine.cancel("longrun").unwrap();

        match handle.join().unwrap() {
            Err(MonteCarloError::Cancelled { .. }) => {}
            Ok(_) => {} // the run finished before the cancellation was observed
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cancelling_an_unknown_simulation_is_a_domain_error() {
        let engine = SimulationEngine::new(10);
        assert!(engine.cancel("nope").is_err());
    }
}
