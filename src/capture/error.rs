use std::io;

/// Error from the instrumentation feed boundary.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Underlying transport failed (pipe closed, file unreadable).
    #[error("feed I/O error: {0}")]
    Io(#[from] io::Error),

    /// The feed carried a line that is not a raw event.
    #[error("malformed feed payload: {0}")]
    Malformed(String),

    /// The feed was closed by its producer with an error message.
    #[error("feed closed by producer: {0}")]
    Closed(String),
}

/// Error terminating a capture run.
///
/// Well-nesting violations inside the stream are NOT errors here: they are
/// recorded as trace incidents and the session continues. This type covers
/// conditions that end the session itself.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("capture queue closed unexpectedly")]
    QueueClosed,
}
