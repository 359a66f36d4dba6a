use anyhow::Result;
use risk_sim_engine::distributions::Distribution;
use risk_sim_engine::model::{ImpactType, Risk, RiskCategory};
use risk_sim_engine::{CorrelationMatrix, SimulationEngine};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::init();

    info!("Starting Monte Carlo cost/schedule risk engine");

    let risks = vec![
        Risk::new(
            "design-rework",
            "Design rework",
            RiskCategory::Cost,
            ImpactType::Cost,
            Distribution::triangular(50_000.0, 120_000.0, 400_000.0)?,
            120_000.0,
        )?,
        Risk::new(
            "permit-delay",
            "Permit delay",
            RiskCategory::Schedule,
            ImpactType::Schedule,
            Distribution::normal(15.0, 5.0)?,
            15.0,
        )?,
        Risk::new(
            "material-escalation",
            "Material cost escalation",
            RiskCategory::Cost,
            ImpactType::Both,
            Distribution::lognormal(11.0, 0.35)?,
            60_000.0,
        )?,
    ];

    let mut correlations = CorrelationMatrix::new(vec!["design-rework".to_string(), "material-escalation".to_string()]);
    correlations.set("design-rework", "material-escalation", 0.4)?;

    let engine = SimulationEngine::new(64);
    let results = engine.run("demo-run", &risks, 10_000, Some(&correlations), Some(42), None, None, None)?;

    info!(
        iterations = results.iterations,
        mean_cost = risk_sim_engine::analysis::descriptive_stats(&results.cost_outcomes).mean,
        converged = results.convergence.converged,
        "simulation completed"
    );

    Ok(())
}
