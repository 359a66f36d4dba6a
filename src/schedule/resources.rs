//! Component D — resource-conflict and availability-window impact analysis.

use crate::error::{MonteCarloError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityPeriod {
    pub start_day: f64,
    pub end_day: f64,
    pub availability_factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConstraint {
    pub id: String,
    pub total_availability: f64,
    pub utilization_limit: f64,
    pub periods: Vec<AvailabilityPeriod>,
}

impl ResourceConstraint {
    pub fn validate(&self, project_duration: f64) -> Result<Vec<String>> {
        if !(self.total_availability > 0.0) {
            return Err(MonteCarloError::validation("total_availability", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.utilization_limit) {
            return Err(MonteCarloError::validation("utilization_limit", "must be in [0, 1]"));
        }
        let mut warnings = Vec::new();
        for p in &self.periods {
            if !(p.start_day < p.end_day) {
                return Err(MonteCarloError::validation("availability period", "start_day must be < end_day"));
            }
            if !(0.0..=1.0).contains(&p.availability_factor) {
                return Err(MonteCarloError::validation("availability_factor", "must be in [0, 1]"));
            }
            if p.end_day > project_duration {
                warnings.push(format!(
                    "resource {} has an availability window extending beyond project duration",
                    self.id
                ));
            }
        }
        Ok(warnings)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityDemand {
    pub activity_id: String,
    pub start_day: f64,
    pub end_day: f64,
    pub demand: f64,
    pub is_critical: bool,
}

/// §4.D: aggregate demand, availability-window impact, scheduling-conflict
/// impact, and utilization-pressure impact for one resource.
pub fn resource_impact<R: Rng + ?Sized>(
    resource: &ResourceConstraint,
    activities: &[ActivityDemand],
    current_schedule_impact: f64,
    rng: &mut R,
) -> f64 {
    let total_demand: f64 = activities.iter().map(|a| a.demand).sum();
    let capacity = resource.total_availability * resource.utilization_limit;
    let base_ratio = if capacity > 0.0 { total_demand / capacity } else { 0.0 };

    let mut availability_impact = 0.0;
    for period in &resource.periods {
        let mut period_impact = 0.0;
        let mut touches_critical = false;
        for a in activities {
            let overlap = overlap_duration(a.start_day, a.end_day, period.start_day, period.end_day);
            if overlap <= 0.0 {
                continue;
            }
            let duration = (a.end_day - a.start_day).max(1e-9);
            let apportioned = a.demand * (overlap / duration);
            period_impact += apportioned * (1.0 - period.availability_factor);
            touches_critical |= a.is_critical;
        }
        if touches_critical {
            period_impact *= 1.5;
        }
        availability_impact += period_impact;
    }

    let conflict_impact = scheduling_conflict_impact(resource, activities, rng);

    let mut pressure_impact = 0.0;
    if base_ratio > 0.8 {
        let pressure = (base_ratio - 0.8) * 2.0;
        let noise: f64 = rng.gen::<f64>() * 0.02 - 0.01;
        pressure_impact = (pressure + noise) * current_schedule_impact.abs() * 0.1;
    }

    availability_impact + conflict_impact + pressure_impact
}

fn overlap_duration(a_start: f64, a_end: f64, b_start: f64, b_end: f64) -> f64 {
    (a_end.min(b_end) - a_start.max(b_start)).max(0.0)
}

fn scheduling_conflict_impact<R: Rng + ?Sized>(
    resource: &ResourceConstraint,
    activities: &[ActivityDemand],
    rng: &mut R,
) -> f64 {
    let mut windows: Vec<&ActivityDemand> = activities.iter().collect();
    windows.sort_by(|a, b| a.start_day.partial_cmp(&b.start_day).unwrap());
    let capacity = resource.total_availability * resource.utilization_limit;
    let mut total_impact = 0.0;

    for i in 0..windows.len() {
        for j in (i + 1)..windows.len() {
            let overlap = overlap_duration(windows[i].start_day, windows[i].end_day, windows[j].start_day, windows[j].end_day);
            if overlap <= 0.0 {
                continue;
            }
            let combined_demand = windows[i].demand + windows[j].demand;
            if combined_demand <= capacity {
                continue;
            }
            let excess_ratio = if capacity > 0.0 { (combined_demand - capacity) / capacity } else { 1.0 };
            let inefficiency = rng.gen_range(0.7..=1.0);
            let mut impact = excess_ratio * overlap * inefficiency;
            if windows[i].is_critical || windows[j].is_critical {
                impact *= 2.0;
            }
            total_impact += impact;
        }
    }
    total_impact
}

/// Utilization-ratio summary used for advisory thresholds.
pub fn utilization_summary(resource: &ResourceConstraint, activities: &[ActivityDemand]) -> UtilizationSummary {
    let total_demand: f64 = activities.iter().map(|a| a.demand).sum();
    let capacity = resource.total_availability * resource.utilization_limit;
    let ratio = if capacity > 0.0 { total_demand / capacity } else { f64::INFINITY };
    let recommend_review = ratio > 0.8;
    let warn = ratio > 0.9;
    UtilizationSummary { ratio, recommend_review, warn }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtilizationSummary {
    pub ratio: f64,
    pub recommend_review: bool,
    pub warn: bool,
}

pub type ResourceMap = HashMap<String, ResourceConstraint>;

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn validate_rejects_bad_availability() {
        let r = ResourceConstraint {
            id: "crew".into(),
            total_availability: 0.0,
            utilization_limit: 0.8,
            periods: vec![],
        };
        assert!(r.validate(100.0).is_err());
    }

    #[test]
    fn high_utilization_warns() {
        let r = ResourceConstraint {
            id: "crew".into(),
            total_availability: 10.0,
            utilization_limit: 1.0,
            periods: vec![],
        };
        let activities = vec![ActivityDemand {
            activity_id: "A".into(),
            start_day: 0.0,
            end_day: 10.0,
            demand: 9.5,
            is_critical: false,
        }];
        let summary = utilization_summary(&r, &activities);
        assert!(summary.warn);
    }

    #[test]
    fn resource_impact_is_nonnegative_with_no_conflicts() {
        let r = ResourceConstraint {
            id: "crew".into(),
            total_availability: 100.0,
            utilization_limit: 0.9,
            periods: vec![],
        };
        let activities = vec![ActivityDemand {
            activity_id: "A".into(),
            start_day: 0.0,
            end_day: 10.0,
            demand: 5.0,
            is_critical: false,
        }];
        let mut rng = StdRng::seed_from_u64(1);
        let impact = resource_impact(&r, &activities, 1.0, &mut rng);
        assert!(impact >= 0.0);
    }
}
