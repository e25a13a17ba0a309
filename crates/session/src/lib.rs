pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod telemetry;
pub mod view;

pub use cache::{CacheStats, ResponseCache};
pub use config::{AppConfig, ModelProvider, OperationMode};
pub use error::PipelineError;
pub use metrics::{Metrics, MetricsSnapshot};
pub use pipeline::{Pipeline, Session};
pub use telemetry::{init_tracing, LogFormat};
pub use view::{DegreeEntry, EntityRow, GraphView, RelationshipRow, StatsPanel, TypeCount};
