/// Runtime failures of a cascade, re-raised by [`crate::Cascade::complete`].
///
/// `FlowFailed` is attached as context to the error that sank the run, so
/// callers can both see which flow failed and still downcast to the flow's
/// own error type underneath it.
#[derive(thiserror::Error, Debug)]
pub enum CascadeError {
    #[error("flow \"{0}\" failed")]
    FlowFailed(String),
    #[error("panic in flow \"{flow}\": {msg}")]
    FlowPanic { flow: String, msg: String },
    #[error("cascade run thread panicked: {0}")]
    RunPanic(String),
}
