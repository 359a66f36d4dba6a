//! Property-based tests for the universally-quantified claims in spec §8
//! (items 1-4, 6, 7). Unit tests exercising fixed scenarios (E1-E6 and
//! friends) live alongside the implementation in `#[cfg(test)]` modules;
//! these instead draw parameters from `proptest` strategies.

use approx::assert_abs_diff_eq;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use risk_sim_engine::correlation::{self, CorrelationMatrix};
use risk_sim_engine::distributions::Distribution;
use risk_sim_engine::escalation::{self, CompoundingFrequency, EscalationFactor, EscalationModel, EscalationType};
use risk_sim_engine::schedule::cpm::{DependencyEdge, DependencyType, ScheduleGraph, TaskSpec};

fn fs_edge(p: &str, s: &str) -> DependencyEdge {
    DependencyEdge { predecessor: p.into(), successor: s.into(), dep_type: DependencyType::FinishToStart, lag: 0.0 }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property 1: for every family/valid parameter set, samples are finite
    /// and respect the family's natural (or declared) bounds.
    #[test]
    fn sampling_stays_within_declared_bounds(
        mean in -1000.0f64..1000.0,
        std in 0.01f64..500.0,
        seed in any::<u64>(),
    ) {
        let dist = Distribution::normal(mean, std).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let samples = dist.sample(&mut rng, 2_000).unwrap();
        prop_assert_eq!(samples.len(), 2_000);
        for s in samples {
            prop_assert!(s.is_finite());
        }
    }

    #[test]
    fn triangular_samples_stay_within_min_max(
        min in 0.0f64..100.0,
        spread_a in 0.1f64..100.0,
        spread_b in 0.1f64..100.0,
        seed in any::<u64>(),
    ) {
        let mode = min + spread_a;
        let max = mode + spread_b;
        let dist = Distribution::triangular(min, mode, max).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let samples = dist.sample(&mut rng, 2_000).unwrap();
        for s in samples {
            prop_assert!(s.is_finite());
            prop_assert!(s >= min - 1e-9 && s <= max + 1e-9);
        }
    }

    #[test]
    fn uniform_samples_stay_within_min_max(
        min in -500.0f64..500.0,
        width in 0.01f64..500.0,
        seed in any::<u64>(),
    ) {
        let max = min + width;
        let dist = Distribution::uniform(min, max).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let samples = dist.sample(&mut rng, 2_000).unwrap();
        for s in samples {
            prop_assert!(s.is_finite());
            prop_assert!(s >= min - 1e-9 && s <= max + 1e-9);
        }
    }

    /// Property 3: correlated sampling induces the target correlation within
    /// tolerance for a two-risk matrix across a range of target rhos.
    #[test]
    fn correlation_induction_matches_target(
        rho in -0.85f64..0.85,
        seed in any::<u64>(),
    ) {
        let mut cm = CorrelationMatrix::new(vec!["A".to_string(), "B".to_string()]);
        cm.set("A", "B", rho).unwrap();
        let l = correlation::cholesky(&cm).unwrap();
        let dists = vec![Distribution::normal(0.0, 1.0).unwrap(), Distribution::normal(0.0, 1.0).unwrap()];
        let mut rng = StdRng::seed_from_u64(seed);
        let m = 20_000;
        let samples = correlation::correlated_sample(&dists, &l, m, &mut rng).unwrap();
        let col_a: Vec<f64> = (0..m).map(|i| samples[(i, 0)]).collect();
        let col_b: Vec<f64> = (0..m).map(|i| samples[(i, 1)]).collect();
        let empirical = risk_sim_engine::mathutil::pearson_correlation(&col_a, &col_b);
        prop_assert!((empirical - rho).abs() < 0.05, "empirical {empirical} vs target {rho}");
    }

    /// Property 4: repairing a (possibly non-PSD) matrix always yields a
    /// matrix that validates, and repairing twice is idempotent.
    #[test]
    fn repair_is_idempotent_and_always_valid(
        rho_ab in -0.99f64..0.99,
        rho_bc in -0.99f64..0.99,
        rho_ac in -0.99f64..0.99,
    ) {
        let mut cm = CorrelationMatrix::new(vec!["A".into(), "B".into(), "C".into()]);
        cm.set("A", "B", rho_ab).unwrap();
        cm.set("B", "C", rho_bc).unwrap();
        cm.set("A", "C", rho_ac).unwrap();

        let repaired_once = correlation::repair(&cm);
        let v1 = correlation::validate(&repaired_once).unwrap();
        prop_assert!(v1.is_valid, "repaired matrix failed validation: {:?}", v1.issues);

        let repaired_twice = correlation::repair(&repaired_once);
        for (key, &rho1) in repaired_once.pairs() {
            let rho2 = repaired_twice.get(&key.0, &key.1);
            prop_assert!((rho1 - rho2).abs() < 1e-6, "repair not idempotent: {rho1} vs {rho2}");
        }
    }

    /// Property 6: adding an edge u -> v is accepted iff v cannot already
    /// reach u; in either case the graph remains acyclic afterward.
    #[test]
    fn cycle_detection_soundness(make_cycle in any::<bool>()) {
        let mut g = ScheduleGraph::new();
        g.add_task(TaskSpec { id: "A".into(), duration: 2.0, baseline_early_start: None }).unwrap();
        g.add_task(TaskSpec { id: "B".into(), duration: 2.0, baseline_early_start: None }).unwrap();
        g.add_task(TaskSpec { id: "C".into(), duration: 2.0, baseline_early_start: None }).unwrap();
        g.add_dependency(fs_edge("A", "B")).unwrap();
        g.add_dependency(fs_edge("B", "C")).unwrap();

        let result = if make_cycle {
            g.add_dependency(fs_edge("C", "A"))
        } else {
            // D has no path back to A, so A -> D cannot create a cycle.
            g.add_task(TaskSpec { id: "D".into(), duration: 1.0, baseline_early_start: None }).unwrap();
            g.add_dependency(fs_edge("A", "D"))
        };

        if make_cycle {
            prop_assert!(result.is_err());
        } else {
            prop_assert!(result.is_ok());
        }
        prop_assert!(g.detect_cycle().is_none());
        prop_assert!(g.compute().is_ok());
    }

    /// Property 7: monotone escalation — sign of the rate determines the
    /// direction of the cost change, and doubling the time span roughly
    /// doubles the escalation multiplier (within the spec's stated band).
    #[test]
    fn escalation_is_monotone_in_rate_sign(
        rate in -0.3f64..0.3,
        base_cost in 1.0f64..1_000_000.0,
        seed in any::<u64>(),
    ) {
        let model = EscalationModel {
            factors: vec![EscalationFactor::new(EscalationType::Inflation, rate, CompoundingFrequency::Annually)],
        };
        let mut rng = StdRng::seed_from_u64(seed);
        let result = escalation::apply_escalation(&model, base_cost, None, 1.0, &mut rng).unwrap();
        if rate >= 0.0 {
            prop_assert!(result.escalated_cost >= base_cost - 1e-6);
        } else {
            prop_assert!(result.escalated_cost <= base_cost + 1e-6);
        }
        if rate.abs() < 1e-9 {
            assert_abs_diff_eq!(result.escalated_cost, base_cost, epsilon = 1e-6);
        }
    }

    #[test]
    fn doubling_time_span_stays_within_expected_band(rate in 0.001f64..0.2) {
        let mult_1y = escalation::compounded_multiplier(rate, CompoundingFrequency::Annually, 1.0);
        let mult_2y = escalation::compounded_multiplier(rate, CompoundingFrequency::Annually, 2.0);
        prop_assume!(mult_1y.abs() > 1e-9);
        let ratio = mult_2y / mult_1y;
        prop_assert!(ratio >= 0.8 * 2.0 && ratio <= 1.3 * 2.0, "ratio {ratio} for rate {rate}");
    }
}
