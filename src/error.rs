use thiserror::Error;

/// Errors surfaced by the recorder's control surface.
///
/// The producer path (`Recorder::record`) never returns errors; tracing must
/// not perturb the host's control flow. Only construction, `enable`, and
/// `disable` can fail.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The output descriptor could not be duplicated at construction time.
    #[error("failed to duplicate sink descriptor")]
    Sink(#[source] std::io::Error),

    /// The flush thread could not be spawned; the recorder stays disabled.
    #[error("failed to spawn flush thread")]
    Spawn(#[source] std::io::Error),

    /// The flush thread panicked and could not be joined cleanly.
    #[error("flush thread panicked during shutdown")]
    FlushThreadPanicked,

    /// The host instrumentation probe failed to attach or detach.
    #[error("instrumentation probe failed")]
    Probe(#[source] anyhow::Error),
}
