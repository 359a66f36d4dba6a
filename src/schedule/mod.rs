//! Schedule network data model (§3 "Schedule data") tying together the
//! CPM engine (component C) and the resource analyzer (component D).

pub mod cpm;
pub mod resources;

use crate::error::{MonteCarloError, Result};
pub use cpm::{CpmResult, DependencyEdge, DependencyType, ScheduleGraph, TaskSpec};
pub use resources::{ActivityDemand, AvailabilityPeriod, ResourceConstraint, UtilizationSummary};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub planned_date_offset_days: f64,
    pub baseline_duration: f64,
    pub is_critical_path: bool,
    pub dependency_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub baseline_duration: f64,
    pub earliest_start: f64,
    pub latest_start: f64,
    pub float_time: f64,
    pub is_critical_path: bool,
    pub resource_requirements: HashMap<String, f64>,
}

impl Activity {
    fn validate(&self, known_resources: &HashMap<String, ResourceConstraint>) -> Result<()> {
        if self.latest_start < self.earliest_start {
            return Err(MonteCarloError::validation("activity", "latest_start must be >= earliest_start"));
        }
        if self.float_time < 0.0 {
            return Err(MonteCarloError::validation("activity", "float_time must be >= 0"));
        }
        for resource_id in self.resource_requirements.keys() {
            if !known_resources.contains_key(resource_id) {
                return Err(MonteCarloError::validation(
                    "activity resource requirement",
                    format!("unknown resource '{resource_id}'"),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleData {
    pub milestones: Vec<Milestone>,
    pub activities: Vec<Activity>,
    pub resources: HashMap<String, ResourceConstraint>,
    pub project_baseline_duration: f64,
}

impl ScheduleData {
    pub fn validate(&self) -> Result<Vec<String>> {
        let milestone_ids: std::collections::HashSet<&str> =
            self.milestones.iter().map(|m| m.id.as_str()).collect();
        for m in &self.milestones {
            for dep in &m.dependency_ids {
                if !milestone_ids.contains(dep.as_str()) {
                    return Err(MonteCarloError::validation(
                        "milestone dependency",
                        format!("milestone '{}' references unknown milestone '{dep}'", m.id),
                    ));
                }
            }
        }
        let mut warnings = Vec::new();
        for a in &self.activities {
            a.validate(&self.resources)?;
        }
        for r in self.resources.values() {
            warnings.extend(r.validate(self.project_baseline_duration)?);
        }
        Ok(warnings)
    }

    /// Build a CPM graph from the activities, using finish-to-start edges
    /// implied by each activity's declared float relative to its
    /// predecessors is not modeled here — callers that need inter-activity
    /// dependencies build a `ScheduleGraph` directly via `cpm::ScheduleGraph`
    /// and supply it alongside this data for the simulation overlay.
    pub fn activity_demands(&self, resource_id: &str) -> Vec<ActivityDemand> {
        self.activities
            .iter()
            .filter_map(|a| {
                a.resource_requirements.get(resource_id).map(|&demand| ActivityDemand {
                    activity_id: a.id.clone(),
                    start_day: a.earliest_start,
                    end_day: a.earliest_start + a.baseline_duration,
                    demand,
                    is_critical: a.is_critical_path,
                })
            })
            .collect()
    }
}
