pub mod axis;
pub mod calibration;
pub mod config;
pub mod contact;
pub mod error;
pub mod filters;
pub mod kinematics;
pub mod limb;
pub mod metrics;
pub mod pipeline;
pub mod simulator;
pub mod stats;
pub mod types;

pub use config::GaitConfig;
pub use error::{CalibrationError, GaitError, GaitResult};
pub use limb::{GaitSession, LimbProcessor};
pub use metrics::{AnalyticsMetrics, MetricsAggregator, SessionReport};
pub use types::{Limb, ProcessedSample, Quaternion, Sample, StepEvent};
