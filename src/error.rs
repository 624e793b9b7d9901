//! Error types for the cluster group operator
//!
//! Provides structured error types for the feature registry, the
//! persistence port, the service mesh reconciler and its cluster clients.

use std::fmt;
use thiserror::Error;

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Resource already exists: {kind}/{name}")]
    ResourceAlreadyExists { kind: String, name: String },

    #[error("Resource still exists: {kind}/{name}")]
    ResourceStillExists { kind: String, name: String },

    // =========================================================================
    // Feature Errors
    // =========================================================================
    #[error("Invalid feature properties: {0}")]
    Validation(String),

    #[error("Unknown feature: {name}")]
    UnknownFeature { name: String },

    #[error("Feature {feature} not found for cluster group {cluster_group_id}")]
    FeatureNotFound { cluster_group_id: u32, feature: String },

    #[error("Stored properties of feature {feature} are unreadable: {reason}")]
    CorruptFeature { feature: String, reason: String },

    #[error("{}", FeatureFailures(.failures))]
    FeaturesFailed { failures: Vec<FeatureFailure> },

    // =========================================================================
    // Reconciliation Errors
    // =========================================================================
    #[error("Timeout waiting for {operation} after {attempts} attempts: {source}")]
    Timeout {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("Could not reconcile {step} on cluster {cluster}: {source}")]
    Reconcile {
        step: String,
        cluster: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Deployment {release} failed: {reason}")]
    Deployment { release: String, reason: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single feature that failed during a reconcile pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureFailure {
    pub feature: String,
    pub error: String,
}

struct FeatureFailures<'a>(&'a [FeatureFailure]);

impl fmt::Display for FeatureFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} feature(s) failed to reconcile", self.0.len())?;
        for failure in self.0 {
            write!(f, "; {}: {}", failure.feature, failure.error)?;
        }
        Ok(())
    }
}

/// What a caller should do with a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Transient remote failure, the whole operation may be retried
    Retry,
    /// Retrying the same input will fail the same way
    NoRetry,
    /// The requested feature is not supported by this process
    NotSupported,
}

impl Error {
    /// Wrap this error with the reconcile step and cluster it happened on
    pub fn in_step(self, step: &str, cluster: &str) -> Self {
        Error::Reconcile {
            step: step.to_string(),
            cluster: cluster.to_string(),
            source: Box::new(self),
        }
    }

    /// Prefix this error with the operation that failed
    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error below any operation or reconcile context
    pub fn root(&self) -> &Error {
        match self {
            Error::Reconcile { source, .. } | Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self.root() {
            Error::UnknownFeature { .. } => ErrorAction::NotSupported,

            Error::Configuration(_)
            | Error::Validation(_)
            | Error::CorruptFeature { .. }
            | Error::Timeout { .. }
            | Error::JsonParse(_)
            | Error::YamlParse(_) => ErrorAction::NoRetry,

            // Remote API, IO, deployment and aggregated feature failures
            _ => ErrorAction::Retry,
        }
    }

    /// Check if this error is a not-found condition
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            Error::ResourceNotFound { .. } | Error::FeatureNotFound { .. } => true,
            Error::Kube(kube::Error::Api(response)) => response.code == 404,
            _ => false,
        }
    }

    /// Check if this error is a create conflict on an existing object
    pub fn is_already_exists(&self) -> bool {
        match self.root() {
            Error::ResourceAlreadyExists { .. } => true,
            Error::Kube(kube::Error::Api(response)) => response.code == 409,
            _ => false,
        }
    }

    /// Check if this error is a convergence timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Error::Timeout { .. })
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self.action(), ErrorAction::Retry)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(
            self.root(),
            Error::Kube(_) | Error::Io(_) | Error::Deployment { .. }
        ) && !self.is_not_found()
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;
