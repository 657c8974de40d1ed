//! # contract: seams between the digest pipeline and the outside world
//!
//! This module defines the two traits the pipeline depends on, plus the plain
//! data types that cross them:
//!
//! - [`DocumentStore`]: list, read and write documents addressed by string
//!   identifiers (filesystem paths or object-store keys).
//! - [`FlowInvoker`]: invoke a remote analysis flow and receive its response
//!   as a stream of [`FlowEvent`]s.
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall`; with the `test-export-mocks`
//!   feature the generated `MockDocumentStore` / `MockFlowInvoker` are exported
//!   for integration tests in this and dependent crates.
//!
//! ## Identifiers
//! - Identifiers use `/` separated path syntax. Directory arithmetic (parent,
//!   join) is done with [`std::path::Path`] on the identifier string, so an
//!   object key such as `src/lib.rs` behaves like a relative path.

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use mockall::automock;

/// Errors raised by a [`DocumentStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{location} is not valid UTF-8")]
    NotUtf8 { location: String },
    #[error("storage backend error on {location}: {message}")]
    Backend { location: String, message: String },
}

impl StoreError {
    pub fn io(location: impl Into<String>, source: std::io::Error) -> Self {
        StoreError::Io {
            location: location.into(),
            source,
        }
    }

    pub fn backend(location: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Backend {
            location: location.into(),
            message: message.into(),
        }
    }
}

/// Trait for the storage the pipeline reads sources from and writes digests to.
///
/// Implemented by the local filesystem store, the S3 store in the CLI crate,
/// and by mocks in tests.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// List every document identifier below `root`.
    ///
    /// Implementations may return directory markers (keys ending in `/`); the
    /// selector drops them.
    async fn list(&self, root: &str) -> Result<Vec<String>, StoreError>;

    /// Read a document as UTF-8 text.
    async fn read(&self, id: &str) -> Result<String, StoreError>;

    /// Read a document if it exists. Absence is `Ok(None)`, not an error.
    async fn read_optional(&self, id: &str) -> Result<Option<String>, StoreError>;

    /// Persist markdown text under `location`, creating parents as needed.
    async fn write_markdown(&self, location: &str, body: &str) -> Result<(), StoreError>;
}

/// Categories of errors reported by the remote flow service.
///
/// Derived from the structured error returned by the service client, never
/// from message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    AccessDenied,
    InternalServer,
    Throttling,
    Validation,
    ResourceNotFound,
    Conflict,
    DependencyFailed,
    BadGateway,
    ServiceQuotaExceeded,
    /// The request never produced a service response (connection, timeout, signing).
    Transport,
    /// The stream could not be decoded into events.
    Decode,
    /// A service error this client does not know.
    Unknown,
}

impl RemoteErrorKind {
    /// The closed set of error kinds worth retrying.
    pub const TRANSIENT: [RemoteErrorKind; 2] =
        [RemoteErrorKind::AccessDenied, RemoteErrorKind::InternalServer];

    pub fn is_transient(self) -> bool {
        Self::TRANSIENT.contains(&self)
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteErrorKind::AccessDenied => "AccessDeniedException",
            RemoteErrorKind::InternalServer => "InternalServerException",
            RemoteErrorKind::Throttling => "ThrottlingException",
            RemoteErrorKind::Validation => "ValidationException",
            RemoteErrorKind::ResourceNotFound => "ResourceNotFoundException",
            RemoteErrorKind::Conflict => "ConflictException",
            RemoteErrorKind::DependencyFailed => "DependencyFailedException",
            RemoteErrorKind::BadGateway => "BadGatewayException",
            RemoteErrorKind::ServiceQuotaExceeded => "ServiceQuotaExceededException",
            RemoteErrorKind::Transport => "TransportError",
            RemoteErrorKind::Decode => "StreamDecodeError",
            RemoteErrorKind::Unknown => "UnknownServiceError",
        };
        f.write_str(name)
    }
}

/// A failed flow invocation or a failed read from its response stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct InvokeError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl InvokeError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// One request to the analysis flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRequest {
    pub flow_identifier: String,
    pub flow_alias_identifier: String,
    /// The document handed to the flow input node (the source file content).
    pub document: String,
}

/// An event observed on the flow's response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// Output node event, possibly carrying a document text chunk.
    Output(Option<String>),
    /// The flow finished; carries the reported completion reason.
    Completion(String),
    /// Trace or other events the pipeline does not use.
    Other,
}

pub type FlowEventStream = BoxStream<'static, Result<FlowEvent, InvokeError>>;

/// Trait for invoking the remote analysis flow.
///
/// Constructed once per run and passed explicitly to the analysis client.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FlowInvoker: Send + Sync {
    /// Start one flow invocation and return its response stream.
    async fn invoke_flow(&self, request: &FlowRequest) -> Result<FlowEventStream, InvokeError>;
}
