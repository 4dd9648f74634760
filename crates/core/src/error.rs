/// Result alias that carries the custom [`VisualizerError`] type.
pub type Result<T> = std::result::Result<T, VisualizerError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum VisualizerError {
    /// The platform offers no audio processing support. Fatal for the whole
    /// feature.
    #[error("audio processing is not supported on this platform")]
    GraphInit,
    /// Tap or analyser wiring failed, or no drawable surface was available.
    /// Recoverable: the host may retry by restarting capture.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The context refused to resume, usually for lack of a user gesture.
    #[error("audio context could not be resumed: {0}")]
    Resume(String),
    /// A node was disconnected twice. Callers always ignore this.
    #[error("disposal failed: {0}")]
    Disposal(String),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Free-form message for failures without a dedicated variant.
    #[error("{0}")]
    Message(String),
    #[error("fft failed: {0}")]
    Fft(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Image(#[from] image::ImageError),
}

impl VisualizerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Creates a [`VisualizerError::Connection`] from any message.
    pub fn connection<T: Into<String>>(msg: T) -> Self {
        Self::Connection(msg.into())
    }

    /// Whether the error ends the whole feature rather than a single session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::GraphInit)
    }
}

impl From<&str> for VisualizerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VisualizerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<realfft::FftError> for VisualizerError {
    fn from(value: realfft::FftError) -> Self {
        Self::Fft(value.to_string())
    }
}
