//! Engine events published to subscribers (TUI, remote mirror, audit log)

use crate::iteration::Iteration;
use crate::signal::Signal;
use crate::state::EngineState;
use crate::subagent::SubagentNode;
use crate::task::Task;

/// Everything the engine tells the outside world. Subscribers receive copies
/// over bounded queues; a slow subscriber loses events and is handed an
/// `EventsDropped` marker instead.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    StateChanged {
        from: EngineState,
        to: EngineState,
    },
    IterationStarted {
        iteration: u32,
        task: Option<Task>,
    },
    /// Raw output chunk, lossily decoded, in stream order.
    OutputAppended {
        iteration: u32,
        chunk: String,
    },
    /// The 4 MiB capture bound was hit; further output for this iteration
    /// is dropped.
    OutputTruncated {
        iteration: u32,
        dropped_bytes: usize,
    },
    SubagentSpawned {
        iteration: u32,
        node: SubagentNode,
    },
    SubagentUpdated {
        iteration: u32,
        node: SubagentNode,
    },
    SubagentFinished {
        iteration: u32,
        node: SubagentNode,
    },
    DetectorFired {
        iteration: u32,
        signal: Signal,
    },
    /// Emitted once per second while sleeping on a rate limit.
    RateLimitCountdown {
        remaining_secs: u64,
    },
    IterationFinished {
        iteration: Iteration,
    },
    TaskUpdated {
        task: Task,
    },
    /// Bus overflow marker: `count` events were dropped for this subscriber.
    EventsDropped {
        count: u64,
    },
    FatalError {
        kind: String,
        message: String,
        hint: Option<String>,
    },
}

impl EngineEvent {
    /// Short name for audit records and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "state_changed",
            Self::IterationStarted { .. } => "iteration_started",
            Self::OutputAppended { .. } => "output_appended",
            Self::OutputTruncated { .. } => "output_truncated",
            Self::SubagentSpawned { .. } => "subagent_spawned",
            Self::SubagentUpdated { .. } => "subagent_updated",
            Self::SubagentFinished { .. } => "subagent_finished",
            Self::DetectorFired { .. } => "detector_fired",
            Self::RateLimitCountdown { .. } => "rate_limit_countdown",
            Self::IterationFinished { .. } => "iteration_finished",
            Self::TaskUpdated { .. } => "task_updated",
            Self::EventsDropped { .. } => "events_dropped",
            Self::FatalError { .. } => "fatal_error",
        }
    }
}
