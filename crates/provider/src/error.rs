//! Error types for the resource lifecycle manager.
//!
//! Every failure carries an [`ErrorKind`] so callers (an HTTP front end, a
//! CLI, a test) can map it to a response without matching on messages. The
//! messages for graph-invariant errors contain stable markers ("circular",
//! "depends on it", "read-only") for callers that only see text.

use thiserror::Error;

/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of provider errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed attributes, decode failure, invalid reference or filter.
    BadRequest,
    /// Duplicate resource type or instance name.
    Conflict,
    /// Unknown resource type or instance.
    NotFound,
    /// A proposed reference would create a dependency cycle.
    Circular,
    /// Non-cascade destroy of an instance that others depend on.
    InUse,
    /// Update or destroy of a read-only instance.
    ReadOnly,
    /// The context was cancelled or its deadline passed.
    Cancelled,
    /// A resource implementation misbehaved or failed.
    Internal,
    /// Several independent failures, joined.
    Multiple,
}

impl ErrorKind {
    /// Get a short description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            Self::BadRequest => "Bad request",
            Self::Conflict => "Conflict",
            Self::NotFound => "Not found",
            Self::Circular => "Circular dependency",
            Self::InUse => "Dependency in use",
            Self::ReadOnly => "Read-only instance",
            Self::Cancelled => "Cancelled",
            Self::Internal => "Internal error",
            Self::Multiple => "Multiple errors",
        }
    }

    /// Whether the error was caused by the request rather than by a resource.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::BadRequest
                | Self::Conflict
                | Self::NotFound
                | Self::Circular
                | Self::InUse
                | Self::ReadOnly
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Lifecycle step an [`Error::Instance`] happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Create,
    Validate,
    Plan,
    Apply,
    Destroy,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Validate => "validate",
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        })
    }
}

/// Errors that can occur while managing resources.
#[derive(Error, Debug)]
pub enum Error {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("circular dependency: {instance:?} references {reference:?} which leads back to {instance:?}")]
    Circular { instance: String, reference: String },

    #[error("cannot destroy {name:?}: instance {dependent:?} depends on it")]
    InUse { name: String, dependent: String },

    #[error("cannot {action} {name:?}: instance is read-only")]
    ReadOnly { action: &'static str, name: String },

    #[error("operation cancelled: {0}")]
    Cancelled(&'static str),

    #[error("internal error: {0}")]
    Internal(String),

    /// A resource implementation reported a failure of its own.
    #[error("{0}")]
    Failed(String),

    /// Failure of one lifecycle step of a named instance.
    #[error("instance {name:?}: {stage}: {source}")]
    Instance {
        name: String,
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    #[error("{}", join_messages(.0))]
    Joined(Vec<Error>),
}

fn join_messages(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Error for a resource-specific failure (bind failed, process exited, ...).
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Wrap this error with the instance and lifecycle step it came from.
    pub fn in_instance(self, name: impl Into<String>, stage: Stage) -> Self {
        Self::Instance {
            name: name.into(),
            stage,
            source: Box::new(self),
        }
    }

    /// Combine errors, flattening nested joins. Returns `None` for an empty list.
    pub fn join(errors: impl IntoIterator<Item = Error>) -> Option<Self> {
        let mut flat = Vec::new();
        for err in errors {
            match err {
                Self::Joined(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Self::Joined(flat)),
        }
    }

    /// Get the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Circular { .. } => ErrorKind::Circular,
            Self::InUse { .. } => ErrorKind::InUse,
            Self::ReadOnly { .. } => ErrorKind::ReadOnly,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Internal(_) | Self::Failed(_) => ErrorKind::Internal,
            Self::Instance { source, .. } => source.kind(),
            Self::Joined(_) => ErrorKind::Multiple,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_circular(&self) -> bool {
        self.kind() == ErrorKind::Circular
    }

    pub fn is_read_only(&self) -> bool {
        self.kind() == ErrorKind::ReadOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_in_messages() {
        let err = Error::Circular {
            instance: "a".into(),
            reference: "b".into(),
        };
        assert!(err.to_string().contains("circular"));

        let err = Error::InUse {
            name: "b".into(),
            dependent: "a".into(),
        };
        assert!(err.to_string().contains("depends on it"));
        assert!(err.to_string().contains("\"a\""));

        let err = Error::ReadOnly {
            action: "update",
            name: "ro".into(),
        };
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_instance_wrapper_keeps_kind() {
        let err = Error::bad_request("port: expected int").in_instance("listener.main", Stage::Validate);
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(
            err.to_string(),
            "instance \"listener.main\": validate: bad request: port: expected int"
        );
    }

    #[test]
    fn test_join() {
        assert!(Error::join(Vec::new()).is_none());

        let single = Error::join(vec![Error::failed("boom")]).unwrap();
        assert_eq!(single.kind(), ErrorKind::Internal);

        let nested = Error::join(vec![
            Error::failed("one"),
            Error::Joined(vec![Error::failed("two"), Error::failed("three")]),
        ])
        .unwrap();
        match &nested {
            Error::Joined(errs) => assert_eq!(errs.len(), 3),
            other => panic!("expected joined error, got {other:?}"),
        }
        assert_eq!(nested.to_string(), "one; two; three");
        assert_eq!(nested.kind(), ErrorKind::Multiple);
    }

    #[test]
    fn test_client_error_kinds() {
        assert!(ErrorKind::Circular.is_client_error());
        assert!(!ErrorKind::Internal.is_client_error());
        assert!(!ErrorKind::Cancelled.is_client_error());
    }
}
