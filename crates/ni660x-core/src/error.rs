//! Error types for the counting application.
//!
//! Errors fall into three categories:
//!
//! 1. **Configuration** - malformed or missing configuration at construction.
//!    Fatal: the application is never created.
//! 2. **Resource** - a hardware resource (counter, gate generator, router)
//!    could not be armed, started, stopped or routed. Surfaced to the caller,
//!    never retried.
//! 3. **Not found** - an operation referenced a channel name that is not
//!    configured. No state changes.
//! 4. **Closed** - a start was requested after the application was closed.

use thiserror::Error;

/// Convenience alias for results using [`CountingError`].
pub type Result<T> = std::result::Result<T, CountingError>;

/// What went wrong with a hardware resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceErrorKind {
    /// Physical channel reserved by another resource.
    Busy,
    /// Invalid timing or sample parameters.
    InvalidParameter,
    /// Device or driver reported a failure.
    Hardware,
    /// Terminal connection could not be made or undone.
    Routing,
}

impl std::fmt::Display for ResourceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ResourceErrorKind::Busy => "busy",
            ResourceErrorKind::InvalidParameter => "invalid_parameter",
            ResourceErrorKind::Hardware => "hardware",
            ResourceErrorKind::Routing => "routing",
        };
        write!(f, "{}", label)
    }
}

/// A hardware resource could not do what was asked of it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Resource '{resource}' {kind} error: {message}")]
pub struct ResourceError {
    /// Physical channel or terminal the error relates to (e.g. `Dev1/ctr0`).
    pub resource: String,
    /// Error category.
    pub kind: ResourceErrorKind,
    /// Human readable detail.
    pub message: String,
}

impl ResourceError {
    /// Create a new resource error.
    pub fn new(
        resource: impl Into<String>,
        kind: ResourceErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for [`ResourceErrorKind::InvalidParameter`].
    pub fn invalid_parameter(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(resource, ResourceErrorKind::InvalidParameter, message)
    }

    /// Shorthand for [`ResourceErrorKind::Busy`].
    pub fn busy(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(resource, ResourceErrorKind::Busy, message)
    }
}

/// Primary error type for coordinator and application operations.
#[derive(Error, Debug)]
pub enum CountingError {
    /// Configuration is malformed or incomplete.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A hardware resource failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// The named channel is not configured.
    #[error("Channel '{0}' not found")]
    NotFound(String),

    /// The application was closed; its routes are gone.
    #[error("Counting application is closed")]
    Closed,

    /// A channel failed to start during `start_channels`.
    ///
    /// `started` lists the channels that were armed before the failure. They
    /// are left running; call `stop()` to reconcile.
    #[error("Failed to start channel '{channel}' ({} already started): {source}", started.len())]
    ChannelStart {
        /// Channel whose start failed.
        channel: String,
        /// Channels armed earlier in the same call.
        started: Vec<String>,
        /// Underlying hardware failure.
        #[source]
        source: ResourceError,
    },
}

impl CountingError {
    /// True for errors raised by hardware resources.
    pub fn is_resource(&self) -> bool {
        matches!(self, Self::Resource(_) | Self::ChannelStart { .. })
    }

    /// True if an unconfigured channel was referenced.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True if the application was already closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// True for configuration errors.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<figment::Error> for CountingError {
    fn from(err: figment::Error) -> Self {
        CountingError::Configuration(err.to_string())
    }
}
