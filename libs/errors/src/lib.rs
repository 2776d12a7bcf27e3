//! Unified error handling for the ampsync tools
//!
//! Two layers live here:
//! - [`PanelError`]: a single remote call against the panel failed. These are
//!   always scoped to one unit of work (a target, a trigger, a task) and are
//!   reported by the caller rather than propagated further.
//! - [`SyncError`]: a fatal run outcome. Every variant aborts the run before any
//!   mutation and maps to a stable process exit code.

use thiserror::Error;

// ============================================================================
// PanelError - remote call failures
// ============================================================================

/// Failure of a single panel API call
#[derive(Debug, Error)]
pub enum PanelError {
    /// Transport-level failure (connect, TLS, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("HTTP status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    /// Response body could not be decoded into the expected shape
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The panel returned an error document (Title/Message)
    #[error("API error: {title}: {message}")]
    Api { title: String, message: String },

    /// An action result came back with Status=false
    #[error("Action failed: {0}")]
    ActionFailed(String),

    /// Panel base URL is not an absolute http(s) URL
    #[error("Invalid panel URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Call attempted without a session id
    #[error("No session established for {0}")]
    NoSession(String),

    /// A looked-up entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias for panel calls
pub type PanelResult<T> = Result<T, PanelError>;

impl PanelError {
    /// Create an action failure from a reason string
    pub fn action_failed(reason: impl Into<String>) -> Self {
        Self::ActionFailed(reason.into())
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

// ============================================================================
// SyncError - fatal run outcomes
// ============================================================================

/// Fatal outcome of a sync run
#[derive(Debug, Error)]
pub enum SyncError {
    // ======================================
    // Startup / configuration
    // ======================================
    #[error("Missing required value for '{field}' ({env_var} or config file)")]
    MissingConfig { field: String, env_var: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ======================================
    // Session
    // ======================================
    #[error("Login failed: {0}")]
    LoginFailed(#[source] PanelError),

    // ======================================
    // Discovery / lookup
    // ======================================
    #[error("Instance status query failed: {0}")]
    InstanceStatusQuery(#[source] PanelError),

    #[error("Instance list query failed: {0}")]
    InstanceList(#[source] PanelError),

    #[error("Master template not found. Friendly name must match pattern '-TEMPLATE <GROUP>-'.")]
    TemplateNotFound,

    #[error("Master template selected but no template group parsed from friendly name.")]
    TemplateGroupUnparseable,

    #[error("Template instance missing instance id.")]
    TemplateMissingId,

    #[error("Failed to load template instance: {0}")]
    TemplateLoad(#[source] PanelError),

    #[error("Failed to query template schedule data: {0}")]
    TemplateSchedule(#[source] PanelError),

    // ======================================
    // Guards
    // ======================================
    #[error("Application type mismatch detected on {} target(s). Halting sync.", .mismatches.len())]
    ApplicationTypeMismatch { mismatches: Vec<String> },
}

/// Result type alias for sync runs
pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingConfig { .. } | Self::InvalidConfig(_) => 1,
            Self::LoginFailed(_) => 2,
            Self::InstanceStatusQuery(_) => 3,
            Self::InstanceList(_) => 4,
            Self::TemplateNotFound | Self::TemplateGroupUnparseable => 5,
            Self::TemplateMissingId => 6,
            Self::TemplateLoad(_) => 7,
            Self::TemplateSchedule(_) => 8,
            Self::ApplicationTypeMismatch { .. } => 9,
        }
    }

    /// Create a missing config error
    pub fn missing_config(field: impl Into<String>, env_var: impl Into<String>) -> Self {
        Self::MissingConfig {
            field: field.into(),
            env_var: env_var.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Get log level
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self {
            Self::MissingConfig { .. } | Self::InvalidConfig(_) => Level::WARN,
            _ => Level::ERROR,
        }
    }
}

// Tests
#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_stage() {
        assert_eq!(SyncError::missing_config("url", "AMP_URL").exit_code(), 1);
        assert_eq!(SyncError::invalid_config("bad").exit_code(), 1);
        assert_eq!(
            SyncError::LoginFailed(PanelError::action_failed("denied")).exit_code(),
            2
        );
        assert_eq!(
            SyncError::InstanceStatusQuery(PanelError::not_found("x")).exit_code(),
            3
        );
        assert_eq!(
            SyncError::InstanceList(PanelError::not_found("x")).exit_code(),
            4
        );
        assert_eq!(SyncError::TemplateNotFound.exit_code(), 5);
        assert_eq!(SyncError::TemplateGroupUnparseable.exit_code(), 5);
        assert_eq!(SyncError::TemplateMissingId.exit_code(), 6);
        assert_eq!(
            SyncError::TemplateLoad(PanelError::not_found("x")).exit_code(),
            7
        );
        assert_eq!(
            SyncError::TemplateSchedule(PanelError::not_found("x")).exit_code(),
            8
        );
    }

    #[test]
    fn test_missing_config_message_names_env_var() {
        let err = SyncError::missing_config("password", "AMP_PASS");
        assert_eq!(
            err.to_string(),
            "Missing required value for 'password' (AMP_PASS or config file)"
        );
    }

    #[test]
    fn test_mismatch_message_counts_targets() {
        let err = SyncError::ApplicationTypeMismatch {
            mismatches: vec!["a".into(), "b".into()],
        };
        assert!(err.to_string().contains("2 target(s)"));
    }
}
