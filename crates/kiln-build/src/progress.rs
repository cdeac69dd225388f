//! Progress events emitted at phase boundaries

use serde::Serialize;

/// Build phase a progress event belongs to, in the order phases occur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    ConfigLoaded,
    GraphAnalyzed,
    StateLoaded,
    DirtySetComputed,
    TargetFinished,
    StateSaved,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConfigLoaded => "config-loaded",
            Self::GraphAnalyzed => "graph-analyzed",
            Self::StateLoaded => "state-loaded",
            Self::DirtySetComputed => "dirty-set-computed",
            Self::TargetFinished => "target-finished",
            Self::StateSaved => "state-saved",
        }
    }
}

/// One progress notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub current: usize,
    pub total: usize,
    /// Target that reached a terminal state, for [`Phase::TargetFinished`]
    pub target: Option<String>,
    /// Short status word for the target (`built`, `cached`, `failed`)
    pub status: Option<&'static str>,
}

impl ProgressEvent {
    pub fn phase(phase: Phase, current: usize, total: usize) -> Self {
        Self {
            phase,
            current,
            total,
            target: None,
            status: None,
        }
    }

    pub fn target(current: usize, total: usize, name: &str, status: &'static str) -> Self {
        Self {
            phase: Phase::TargetFinished,
            current,
            total,
            target: Some(name.to_string()),
            status: Some(status),
        }
    }
}

/// Receives progress events. Called from worker threads.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Sink that discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_closure_sink_receives_events() {
        let seen = Mutex::new(Vec::new());
        let sink = |event: &ProgressEvent| seen.lock().push(event.phase);
        sink.on_progress(&ProgressEvent::phase(Phase::StateLoaded, 0, 3));
        sink.on_progress(&ProgressEvent::target(1, 3, "lib", "built"));
        assert_eq!(
            *seen.lock(),
            vec![Phase::StateLoaded, Phase::TargetFinished]
        );
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(Phase::DirtySetComputed.name(), "dirty-set-computed");
        assert_eq!(Phase::TargetFinished.name(), "target-finished");
    }
}
