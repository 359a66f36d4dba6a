//! §3 data model: risks, results, convergence metrics.

use crate::correlation::CorrelationMatrix;
use crate::distributions::Distribution;
use crate::error::{MonteCarloError, Result};
use crate::schedule::ScheduleData;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Technical,
    Schedule,
    Cost,
    Resource,
    External,
    Quality,
    Regulatory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactType {
    Cost,
    Schedule,
    Both,
}

impl ImpactType {
    pub fn affects_cost(&self) -> bool {
        matches!(self, ImpactType::Cost | ImpactType::Both)
    }

    pub fn affects_schedule(&self) -> bool {
        matches!(self, ImpactType::Schedule | ImpactType::Both)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Risk {
    pub id: String,
    pub name: String,
    pub category: RiskCategory,
    pub impact_type: ImpactType,
    pub distribution: Distribution,
    pub baseline_impact: f64,
    pub correlation_dependency_ids: Vec<String>,
    pub mitigation_strategies: Vec<MitigationStrategy>,
}

impl Risk {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: RiskCategory,
        impact_type: ImpactType,
        distribution: Distribution,
        baseline_impact: f64,
    ) -> Result<Self> {
        let id = id.into();
        let name = name.into();
        if id.is_empty() {
            return Err(MonteCarloError::validation("risk id", "must be non-empty"));
        }
        if name.is_empty() {
            return Err(MonteCarloError::validation("risk name", "must be non-empty"));
        }
        if !baseline_impact.is_finite() {
            return Err(MonteCarloError::validation("baseline_impact", "must be finite"));
        }
        Ok(Self {
            id,
            name,
            category,
            impact_type,
            distribution,
            baseline_impact,
            correlation_dependency_ids: Vec::new(),
            mitigation_strategies: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitigationStrategy {
    pub id: String,
    pub name: String,
    pub cost: f64,
    pub effectiveness: f64,
    pub realization_probability: f64,
}

/// Immutable simulation output artifact (§3 "SimulationResults").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResults {
    pub simulation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub iterations: u64,
    pub cost_outcomes: Vec<f64>,
    pub schedule_outcomes: Vec<f64>,
    pub risk_contributions: HashMap<String, Vec<f64>>,
    pub convergence: ConvergenceMetrics,
    pub wall_time: std::time::Duration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConvergenceMetrics {
    pub mean_stability: f64,
    pub variance_stability: f64,
    pub percentile_stability: HashMap<u32, f64>,
    pub converged: bool,
    pub iterations_to_convergence: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskModification {
    pub baseline_impact_delta: Option<f64>,
    pub distribution_override: Option<Distribution>,
    pub applied_mitigation_id: Option<String>,
}

impl Default for RiskModification {
    fn default() -> Self {
        Self { baseline_impact_delta: None, distribution_override: None, applied_mitigation_id: None }
    }
}

/// A scenario owns a deep copy of its risks exclusively (DESIGN.md
/// "Owned scenarios, not reference webs").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub name: String,
    pub description: String,
    pub risks: Vec<Risk>,
    pub modifications: HashMap<String, RiskModification>,
    pub results: Option<SimulationResults>,
}

/// Full simulation input bundle, grouped for convenience at call sites.
#[derive(Debug, Clone, Default)]
pub struct SimulationInput {
    pub correlations: Option<CorrelationMatrix>,
    pub baseline_costs: HashMap<String, f64>,
    pub schedule: Option<ScheduleData>,
    pub schedule_graph: Option<crate::schedule::ScheduleGraph>,
}

pub fn validate_risks(risks: &[Risk]) -> Result<()> {
    if risks.is_empty() {
        return Err(MonteCarloError::validation("risks", "must be non-empty"));
    }
    let mut seen = std::collections::HashSet::new();
    for r in risks {
        if !seen.insert(r.id.as_str()) {
            return Err(MonteCarloError::validation("risks", format!("duplicate risk id '{}'", r.id)));
        }
    }
    Ok(())
}
