use std::fmt;
use std::sync::Mutex;

/// Lifecycle state of a whole cascade run.
///
/// States only move forward: `Pending` to `Running`, and from there to
/// exactly one of the finished states. Attempts to finish an already
/// finished run are ignored, so the first outcome recorded wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeState {
    Pending,
    Running,
    Successful,
    Failed,
    Stopped,
}

impl CascadeState {
    /// True once the run has reached a terminal state.
    #[inline]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Successful | Self::Failed | Self::Stopped)
    }
}

impl fmt::Display for CascadeState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle state of one flow within a cascade run. Same transitions as
/// [`CascadeState`], plus `Skipped` for flows whose sinks were up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Pending,
    Running,
    Successful,
    Failed,
    Stopped,
    Skipped,
}

impl FlowState {
    /// True once the flow has reached a terminal state.
    #[inline]
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            Self::Successful | Self::Failed | Self::Stopped | Self::Skipped
        )
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
            Self::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// State holder for a cascade run. Shared between the controlling thread,
/// the run thread, and every job, so transitions go through a lock.
#[derive(Debug)]
pub(crate) struct CascadeStats {
    name: String,
    state: Mutex<CascadeState>,
}

impl CascadeStats {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            state: Mutex::new(CascadeState::Pending),
        }
    }

    pub(crate) fn state(&self) -> CascadeState {
        *self.state.lock().expect("cascade state lock")
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    pub(crate) fn mark_running(&self) {
        let mut state = self.state.lock().expect("cascade state lock");
        if *state == CascadeState::Pending {
            log::debug!("cascade \"{}\": pending -> running", self.name);
            *state = CascadeState::Running;
        } else {
            log::trace!("cascade \"{}\": already {state}, not marking running", self.name);
        }
    }

    pub(crate) fn mark_successful(&self) {
        self.finish(CascadeState::Successful);
    }

    pub(crate) fn mark_failed(&self) {
        self.finish(CascadeState::Failed);
    }

    pub(crate) fn mark_stopped(&self) {
        self.finish(CascadeState::Stopped);
    }

    fn finish(&self, outcome: CascadeState) {
        let mut state = self.state.lock().expect("cascade state lock");
        if state.is_finished() {
            log::trace!("cascade \"{}\": already {state}, not marking {outcome}", self.name);
        } else {
            log::debug!("cascade \"{}\": {state} -> {outcome}", self.name);
            *state = outcome;
        }
    }
}

/// State holder for one flow. Created when the cascade is built and marked
/// by the job that runs the flow, so it outlives the per-run job table.
#[derive(Debug)]
pub(crate) struct FlowStats {
    flow: String,
    state: Mutex<FlowState>,
}

impl FlowStats {
    pub(crate) fn new(flow: &str) -> Self {
        Self {
            flow: flow.to_owned(),
            state: Mutex::new(FlowState::Pending),
        }
    }

    pub(crate) fn state(&self) -> FlowState {
        *self.state.lock().expect("flow state lock")
    }

    pub(crate) fn mark_running(&self) {
        let mut state = self.state.lock().expect("flow state lock");
        if *state == FlowState::Pending {
            log::debug!("flow \"{}\": pending -> running", self.flow);
            *state = FlowState::Running;
        } else {
            log::trace!("flow \"{}\": already {state}, not marking running", self.flow);
        }
    }

    pub(crate) fn mark_successful(&self) {
        self.finish(FlowState::Successful);
    }

    pub(crate) fn mark_failed(&self) {
        self.finish(FlowState::Failed);
    }

    pub(crate) fn mark_stopped(&self) {
        self.finish(FlowState::Stopped);
    }

    pub(crate) fn mark_skipped(&self) {
        self.finish(FlowState::Skipped);
    }

    fn finish(&self, outcome: FlowState) {
        let mut state = self.state.lock().expect("flow state lock");
        if state.is_finished() {
            log::trace!("flow \"{}\": already {state}, not marking {outcome}", self.flow);
        } else {
            log::debug!("flow \"{}\": {state} -> {outcome}", self.flow);
            *state = outcome;
        }
    }
}

#[cfg(test)]
mod test {
    use super::{CascadeState, CascadeStats, FlowState, FlowStats};

    #[test]
    fn test_cascade_first_outcome_wins() {
        let stats = CascadeStats::new("c");
        assert_eq!(stats.state(), CascadeState::Pending);
        stats.mark_running();
        assert_eq!(stats.state(), CascadeState::Running);
        stats.mark_failed();
        stats.mark_successful();
        assert_eq!(stats.state(), CascadeState::Failed);
    }

    #[test]
    fn test_cascade_can_finish_without_running() {
        let stats = CascadeStats::new("c");
        stats.mark_stopped();
        assert_eq!(stats.state(), CascadeState::Stopped);
        stats.mark_running();
        assert_eq!(stats.state(), CascadeState::Stopped);
    }

    #[test]
    fn test_flow_skip_is_terminal() {
        let stats = FlowStats::new("f");
        stats.mark_skipped();
        assert!(stats.state().is_finished());
        stats.mark_running();
        stats.mark_failed();
        assert_eq!(stats.state(), FlowState::Skipped);
    }
}
