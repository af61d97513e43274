//! Error handling for stackctl
//!
//! Every lifecycle failure names the action it happened in and the service type
//! or component it belongs to, so operators can map a failure back to a single
//! action-table entry.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{Action, ComponentKind};

/// Main error type for stackctl
#[derive(Error, Debug)]
pub enum StackError {
    /// start/stop attempted before any install was traced
    #[error("Can not {action} {component} since it was not installed")]
    NotInstalled {
        action: Action,
        component: ComponentKind,
    },

    /// No action-table entry for the service type or action
    #[error("Currently we do not know how to {action} for database type [{service_type}]")]
    UnsupportedType {
        action: Action,
        service_type: String,
    },

    /// Trace store could not be written or read
    #[error("Trace storage failure during {action} of {component} at {}: {source}", path.display())]
    StorageFailure {
        action: Action,
        component: ComponentKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A command could not be spawned or exited non-zero
    #[error("{action} for [{service_type}] failed running `{command}`: {reason}")]
    ExecutionFailure {
        action: Action,
        service_type: String,
        command: String,
        reason: String,
    },

    /// A template placeholder had no matching parameter
    #[error("{action} for [{service_type}] has unresolved placeholder %{placeholder}%")]
    UnresolvedPlaceholder {
        action: Action,
        service_type: String,
        placeholder: String,
    },

    /// Host filesystem operation failed outside the trace store
    #[error("Filesystem error during {action} for [{service_type}] at {}: {source}", path.display())]
    Filesystem {
        action: Action,
        service_type: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration, package-list or template error hit inside a lifecycle
    /// operation
    #[error("{action} for [{service_type}] failed: {source}")]
    Lifecycle {
        action: Action,
        service_type: String,
        #[source]
        source: Box<StackError>,
    },

    /// Malformed command template (action table or package list)
    #[error("Template error: {0}")]
    Template(String),

    /// Configuration errors (loading, parsing, missing keys)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Install state machine transition errors
    #[error("Install transition error: {0}")]
    InstallTransition(String),
}

/// Result type alias for stackctl operations
pub type Result<T> = std::result::Result<T, StackError>;

impl StackError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a template error
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    pub fn unsupported(action: Action, service_type: impl Into<String>) -> Self {
        Self::UnsupportedType {
            action,
            service_type: service_type.into(),
        }
    }

    /// The action the failure belongs to, when it is tied to one
    pub fn action(&self) -> Option<Action> {
        match self {
            Self::NotInstalled { action, .. }
            | Self::UnsupportedType { action, .. }
            | Self::StorageFailure { action, .. }
            | Self::ExecutionFailure { action, .. }
            | Self::UnresolvedPlaceholder { action, .. }
            | Self::Filesystem { action, .. }
            | Self::Lifecycle { action, .. } => Some(*action),
            Self::Template(_) | Self::Config(_) | Self::InstallTransition(_) => None,
        }
    }

    /// Attach `action` and `service_type` to an error that has neither.
    /// Errors already tied to an action pass through unchanged.
    pub fn in_lifecycle(self, action: Action, service_type: &str) -> Self {
        if self.action().is_some() {
            return self;
        }
        Self::Lifecycle {
            action,
            service_type: service_type.to_string(),
            source: Box::new(self),
        }
    }
}
