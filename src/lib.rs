//! # Docflow - Document Event Automation
//!
//! Docflow reacts to lifecycle events on content documents. Handlers are
//! registered in a blueprint with a trigger operation set and a declarative
//! filter; when an event arrives, the engine evaluates each filter against
//! the event snapshot and invokes every matching handler under its own
//! timeout, with failures isolated per handler.
//!
//! ## Core Concepts
//!
//! - **DocumentEvent**: One lifecycle occurrence (create/publish/update/delete)
//!   with a point-in-time field snapshot
//! - **FilterPredicate**: A conjunction of field conditions deciding whether a
//!   handler runs, evaluated centrally before invocation
//! - **Blueprint**: The validated, load-time registry of handler registrations
//! - **HandlerOutcome**: The terminal per-handler result of a dispatch:
//!   completed, skipped, or failed with a classified error kind
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docflow::{Blueprint, Engine, FilterPredicate, HandlerRegistration, Operation};
//! use docflow::handlers::PublishStampHandler;
//!
//! let mut blueprint = Blueprint::new();
//! blueprint.register(
//!     HandlerRegistration::new("stamp-published-at", Arc::new(PublishStampHandler::new("publishedAt")))
//!         .on(Operation::Publish)
//!         .with_filter(FilterPredicate::parse("!defined(publishedAt)")?),
//! )?;
//!
//! let engine = Engine::new(blueprint, store, actions);
//! let outcomes = engine.handle_event(&envelope).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod event;
pub mod filter;
pub mod outcome;
pub mod value;

// Clients, registry, and dispatch
pub mod blueprint;
pub mod engine;
pub mod handler;
pub mod handlers;
pub mod router;
pub mod runtime;
pub mod store;

// Re-export primary types at crate root for convenience
pub use blueprint::{Blueprint, HandlerRegistration, RegistrationConfig, DEFAULT_TIMEOUT};
pub use engine::Engine;
pub use error::{ConfigError, DecodeError, EngineError, EngineResult, HandlerError};
pub use event::{
    ClientOptions, DocumentEvent, DocumentId, EventEnvelope, EventId, Operation, Snapshot,
};
pub use filter::{FilterParseError, FilterPredicate};
pub use handler::{EventHandler, HandlerContext, Resolution};
pub use outcome::{DispatchOutcome, ErrorKind, HandlerOutcome, SKIP_FILTER_NOT_MATCHED};
pub use router::Router;
pub use runtime::HandlerRuntime;
pub use store::{
    ActionClient, ActionError, ActionRequest, ActionResponse, CommitAck, CommitOptions,
    DocumentStore, GenerationRequest, GenerationResult, InMemoryDocumentStore, Patch, StoreError,
};
pub use value::FieldValue;
