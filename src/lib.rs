pub mod error;
pub mod mathutil;
pub mod model;
pub mod distributions;
pub mod correlation;
pub mod schedule;
pub mod config;
pub mod engine;
pub mod analysis;
pub mod escalation;
pub mod outputs;
pub mod scenario;
pub mod calibration;
pub mod validator;

pub use error::{MonteCarloError, Result};
pub use model::{
    ConvergenceMetrics, ImpactType, MitigationStrategy, Risk, RiskCategory, RiskModification,
    Scenario, SimulationInput, SimulationResults,
};
pub use distributions::Distribution;
pub use correlation::CorrelationMatrix;
pub use config::Configuration;
pub use engine::{CancellationToken, ProgressUpdate, SimulationEngine, SimulationStatus};
