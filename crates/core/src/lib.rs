pub mod config;
pub mod criteria;
pub mod engine;
pub mod interfaces;
pub mod metrics;
pub mod pattern_library;
pub mod patterns;
pub mod planning;
pub mod run;
pub mod sink;
pub mod types;
pub mod validator;

pub use config::{ConfigError, EngineConfig, RecoveryPolicy};
pub use criteria::{Criterion, CriterionError};
pub use engine::{EngineError, ExecutionEngine};
pub use interfaces::{
    OracleError, PlanningOracle, RecordSink, SinkError, SnapshotError, SnapshotProvider,
};
pub use metrics::{Metrics, MetricsSnapshot};
pub use patterns::{Bindings, PatternError, PatternMatch, PatternMatcher, Template};
pub use planning::{parse_plan, Plan, PlanDefaults, PlanError};
pub use run::{CancellationFlag, PendingRecheck, PlanSegment, PlanSource, QueuedStep, RunState};
pub use sink::{MemoryRecordSink, NullRecordSink};
pub use types::*;
pub use validator::StateValidator;
