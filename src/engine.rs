//! The engine facade.
//!
//! An [`Engine`] is constructed once at startup from a validated blueprint
//! and injected store/action clients, then invoked once per inbound
//! lifecycle event. Each invocation is an independent unit of work: the only
//! shared state is the read-only blueprint, so the host may call
//! [`Engine::handle_event`] concurrently for different events without
//! cross-event ordering guarantees.

use std::sync::Arc;

use crate::error::EngineResult;
use crate::event::{DocumentEvent, EventEnvelope};
use crate::handler::HandlerContext;
use crate::outcome::DispatchOutcome;
use crate::router::Router;
use crate::store::{ActionClient, DocumentStore};
use crate::Blueprint;

/// The document event automation engine.
pub struct Engine {
    router: Router,
    store: Arc<dyn DocumentStore>,
    actions: Arc<dyn ActionClient>,
}

impl Engine {
    /// Builds an engine from a validated blueprint and injected clients.
    #[must_use]
    pub fn new(
        blueprint: Blueprint,
        store: Arc<dyn DocumentStore>,
        actions: Arc<dyn ActionClient>,
    ) -> Self {
        Self {
            router: Router::new(Arc::new(blueprint)),
            store,
            actions,
        }
    }

    /// The blueprint this engine routes with.
    #[must_use]
    pub fn blueprint(&self) -> &Blueprint {
        self.router.blueprint()
    }

    /// Handles one raw wire envelope: decode, build the per-invocation
    /// context (threading the host's opaque client options through), and run
    /// one dispatch.
    ///
    /// # Errors
    /// Returns a decode error for a malformed envelope. Handler failures are
    /// not errors here; they surface as `Failed` outcomes.
    pub async fn handle_event(
        &self,
        envelope: &serde_json::Value,
    ) -> EngineResult<Vec<DispatchOutcome>> {
        let (event, client_options) = EventEnvelope::from_json(envelope)?.into_event()?;
        let ctx = HandlerContext::new(
            Arc::clone(&self.store),
            Arc::clone(&self.actions),
            client_options,
        );
        Ok(self.dispatch(event, ctx).await)
    }

    /// Dispatches an already-decoded event with an explicit context.
    ///
    /// Exposed for hosts that construct events themselves and for tests.
    pub async fn dispatch(
        &self,
        event: DocumentEvent,
        ctx: HandlerContext,
    ) -> Vec<DispatchOutcome> {
        self.router.dispatch(event, ctx).await
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registrations", &self.blueprint().len())
            .finish_non_exhaustive()
    }
}
