// Structured error kinds for the capture → compose → persist pipeline.
//
// Components return `anyhow::Result<T>` everywhere (matching the rest of the
// crate); this enum exists for callers at the command boundary (§6) who need
// to distinguish failure kinds rather than just display a string. Build one
// with `CoreError::...` and attach it to an `anyhow::Error` chain via
// `.context(CoreError::...)`; recover it with `error.downcast_ref::<CoreError>()`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("precondition unmet: {0}")]
    PreconditionUnmet(String),

    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transient I/O failure: {0}")]
    TransientIoFailure(String),

    #[error("compositor refused: {0}")]
    CompositorRefused(String),

    #[error("feature conflict: {0}")]
    FeatureConflict(String),
}

impl CoreError {
    /// True for failures that should be retried by the caller without
    /// any state change (matches §7's "Per-frame failures ... logged and
    /// the frame is dropped" policy at the command level).
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::TransientIoFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_roundtrip() {
        let err: anyhow::Error =
            anyhow::anyhow!("window not found").context(CoreError::PreconditionUnmet(
                "target window not found".into(),
            ));
        let kind = err.downcast_ref::<CoreError>().expect("kind attached");
        assert_eq!(
            *kind,
            CoreError::PreconditionUnmet("target window not found".into())
        );
    }
}
