//! Research pipeline: run state, usage accounting, research fan-out, checkpointing, and the
//! stage graph that ties them together.

pub mod builder;
pub mod checkpoint;
pub mod fanout;
pub mod graph;
pub mod orchestrator;
pub mod state;
pub mod usage;

pub use builder::build_flow;
pub use checkpoint::ResearchCheckpoint;
pub use fanout::{concatenate_successes, FanOutExecutor, StageTask, TaskResult};
pub use orchestrator::{
    Completion, FlowSettings, FlowStep, ResearchFlow, RetryPolicy, RunOutcome, StageSet,
    StageUsage, TopicFailure,
};
pub use state::PipelineState;
pub use usage::{add_usage, UsageMetrics};
