//! Abstract client traits for the engine's external collaborators.
//!
//! Handlers never talk to a backend directly; every side effect goes through
//! these traits. By using traits, we enable:
//! - In-memory fakes for testing and embedded use
//! - Real store/API clients in production
//! - Per-invocation scoping driven by opaque client options

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::DocumentId;
use crate::value::FieldValue;

/// Errors that can occur during document store operations.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum StoreError {
    /// Document not found.
    #[error("Document not found: {0}")]
    DocumentNotFound(DocumentId),

    /// A write lost a race against another writer.
    #[error("Write conflict on {document_id}: {detail}")]
    Conflict {
        document_id: DocumentId,
        detail: String,
    },

    /// The generation action failed or returned an error payload.
    #[error("Generation action failed: {detail}")]
    ActionFailed { detail: String },

    /// Backend error.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// An atomic set of field writes committed to one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Field path to value assignments, applied together or not at all.
    pub set: BTreeMap<String, FieldValue>,
}

impl Patch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a set operation, builder style.
    #[must_use]
    pub fn set(mut self, path: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set.insert(path.into(), value.into());
        self
    }

    /// True when the patch writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

/// Options for a patch commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOptions {
    /// Write to the published document even from a draft context.
    #[serde(default)]
    pub force_published_write: bool,
}

/// Acknowledgement of a committed patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAck {
    /// The document that was written.
    pub document_id: DocumentId,
    /// Revision assigned by the store after the write.
    pub revision: u64,
}

/// How a generation instruction parameter is bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamBinding {
    /// Bind the parameter to a document field's current value.
    Field {
        /// Dotted field path.
        path: String,
    },
}

/// A templated generation action: derive a field's value from other fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The document to derive against and write into.
    pub document_id: DocumentId,
    /// Templated instruction; `$name` placeholders are bound via
    /// `instruction_params`.
    pub instruction: String,
    /// Parameter name to binding.
    pub instruction_params: BTreeMap<String, ParamBinding>,
    /// Field path the result is written to.
    pub target_path: String,
}

impl GenerationRequest {
    /// Starts a request for a document and target field.
    #[must_use]
    pub fn new(
        document_id: DocumentId,
        instruction: impl Into<String>,
        target_path: impl Into<String>,
    ) -> Self {
        Self {
            document_id,
            instruction: instruction.into(),
            instruction_params: BTreeMap::new(),
            target_path: target_path.into(),
        }
    }

    /// Binds `$name` in the instruction to a document field.
    #[must_use]
    pub fn bind_field(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.instruction_params
            .insert(name.into(), ParamBinding::Field { path: path.into() });
        self
    }
}

/// Result of a generation action; the store has already written the value to
/// the request's target path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// The derived value.
    pub value: FieldValue,
}

/// The document store client.
///
/// # Concurrency
/// The store is a shared, multi-writer resource. The engine performs no
/// client-side locking; each write is independent and must be
/// idempotent-by-design at the handler level. Implementations that enforce
/// optimistic concurrency surface lost races as [`StoreError::Conflict`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads the current value of one field, `None` when absent.
    async fn read_field(
        &self,
        document_id: &DocumentId,
        path: &str,
    ) -> Result<Option<FieldValue>, StoreError>;

    /// Commits a transactional patch to one document.
    async fn commit_patch(
        &self,
        document_id: &DocumentId,
        patch: Patch,
        opts: CommitOptions,
    ) -> Result<CommitAck, StoreError>;

    /// Invokes a templated generation action and writes the result to the
    /// request's target path.
    async fn run_generation_action(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResult, StoreError>;
}

/// Errors from the opaque action/API client.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ActionError {
    /// The call may succeed if repeated later.
    #[error("Transient action error: {message}")]
    Transient { message: String },

    /// Repeating the call will not help.
    #[error("Terminal action error: {message}")]
    Terminal { message: String },
}

impl ActionError {
    /// Creates a transient error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Creates a terminal error.
    #[must_use]
    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal {
            message: message.into(),
        }
    }

    /// True when a later attempt could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// An opaque external API call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Logical endpoint or operation name.
    pub endpoint: String,
    /// Request payload.
    pub payload: serde_json::Value,
}

impl ActionRequest {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new(endpoint: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            endpoint: endpoint.into(),
            payload,
        }
    }
}

/// Response from an external API call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Response payload.
    pub payload: serde_json::Value,
}

/// The external action/API client. Calls are awaitable and failures are
/// classifiable as transient vs terminal.
#[async_trait]
pub trait ActionClient: Send + Sync {
    /// Performs one request/response call.
    async fn call(&self, request: ActionRequest) -> Result<ActionResponse, ActionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure traits are object-safe
    fn _assert_document_store_object_safe(_: &dyn DocumentStore) {}
    fn _assert_action_client_object_safe(_: &dyn ActionClient) {}

    #[test]
    fn test_store_error_display() {
        let err = StoreError::DocumentNotFound(DocumentId::new("doc-1"));
        assert!(err.to_string().contains("doc-1"));

        let err = StoreError::Conflict {
            document_id: DocumentId::new("doc-2"),
            detail: "revision mismatch".to_string(),
        };
        assert!(err.to_string().contains("revision mismatch"));
    }

    #[test]
    fn test_patch_builder() {
        let patch = Patch::new()
            .set("publishedAt", "2024-01-01T00:00:00Z")
            .set("revisionNote", "initial");
        assert_eq!(patch.set.len(), 2);
        assert!(!patch.is_empty());
        assert!(Patch::new().is_empty());
    }

    #[test]
    fn test_generation_request_builder() {
        let req = GenerationRequest::new(DocumentId::new("doc-1"), "Summarize $body", "autoSummary")
            .bind_field("body", "body");
        assert_eq!(req.target_path, "autoSummary");
        assert_eq!(
            req.instruction_params.get("body"),
            Some(&ParamBinding::Field {
                path: "body".to_string()
            })
        );
    }

    #[test]
    fn test_action_error_classification() {
        assert!(ActionError::transient("reset").is_transient());
        assert!(!ActionError::terminal("bad request").is_transient());
    }
}
