use thiserror::Error;

/// Guidance shown alongside a failed recommendation request.
pub const TROUBLESHOOTING: &[&str] = &[
    "Check your API key configuration",
    "Ensure you have internet connectivity",
    "Try again in a few moments",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GlucoseError {
    /// Input outside its domain. Raised before any state changes.
    #[error("{0}")]
    Validation(String),
    /// The text-generation collaborator failed (network, auth, quota, bad response).
    #[error("Error generating recommendations: {0}")]
    Recommendation(String),
    #[error("A recommendation request is already in progress for this session")]
    RequestInFlight,
}

impl GlucoseError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Troubleshooting lines for the error, if any apply.
    #[must_use]
    pub fn troubleshooting(&self) -> &'static [&'static str] {
        match self {
            Self::Recommendation(_) => TROUBLESHOOTING,
            _ => &[],
        }
    }
}
