//! Client interfaces for external collaborators and the in-memory backend.

/// In-memory backend for tests and embedded use.
pub mod memory;
/// Abstract client traits and request/response types.
pub mod traits;

pub use memory::InMemoryDocumentStore;
pub use traits::{
    ActionClient, ActionError, ActionRequest, ActionResponse, CommitAck, CommitOptions,
    DocumentStore, GenerationRequest, GenerationResult, ParamBinding, Patch, StoreError,
};
