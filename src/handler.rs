//! The handler contract.
//!
//! A handler is a unit of side-effecting logic bound (via the blueprint) to
//! one or more trigger operations and a filter. Handlers are written assuming
//! their filter precondition already holds: filter evaluation happens
//! centrally in the router, which keeps handler logic side-effect-focused and
//! testable independent of routing.
//!
//! Handlers declare their collaborators through [`HandlerContext`] rather
//! than reaching for ambient singletons, so tests can substitute fakes.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::event::{ClientOptions, DocumentEvent};
use crate::store::{ActionClient, DocumentStore};

/// How a handler resolved once invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The handler performed its work.
    Done,
    /// The handler found nothing to do (e.g. a guard re-check showed the
    /// target field already defined).
    Skipped {
        /// Why nothing was done.
        reason: String,
    },
}

impl Resolution {
    /// Builds a skipped resolution.
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

/// Collaborators injected into each handler invocation.
///
/// `client_options` is the opaque per-invocation scoping the host supplied in
/// the event envelope; it is threaded through unchanged.
#[derive(Clone)]
pub struct HandlerContext {
    /// The document store client for this invocation.
    pub store: Arc<dyn DocumentStore>,
    /// The external action/API client for this invocation.
    pub actions: Arc<dyn ActionClient>,
    /// Opaque host-supplied client options.
    pub client_options: ClientOptions,
}

impl HandlerContext {
    /// Builds a context from injected clients.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        actions: Arc<dyn ActionClient>,
        client_options: ClientOptions,
    ) -> Self {
        Self {
            store,
            actions,
            client_options,
        }
    }
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("client_options", &self.client_options)
            .finish_non_exhaustive()
    }
}

/// The typed interface every handler implements.
///
/// # Invariants
/// - The event is immutable; handlers mutate documents only through the
///   store client in `ctx`.
/// - Errors returned here are caught and classified at the runtime boundary;
///   they never abort sibling handlers.
/// - Partial effects must be safe to leave behind: individual patches are
///   atomic, but a handler abandoned at its timeout is not rolled back.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one matching event.
    async fn handle(
        &self,
        event: &DocumentEvent,
        ctx: &HandlerContext,
    ) -> Result<Resolution, HandlerError>;
}
