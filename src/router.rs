//! The event router.
//!
//! One dispatch takes one inbound lifecycle event through the blueprint:
//! select registrations by trigger operation, evaluate each filter centrally,
//! and invoke matching handlers through the runtime in registration order.
//! The router holds no mutable state beyond transient per-dispatch
//! bookkeeping; no ordering guarantee exists across separate, concurrently
//! arriving events.

use std::sync::Arc;

use tracing::{debug, info};

use crate::blueprint::Blueprint;
use crate::event::DocumentEvent;
use crate::handler::HandlerContext;
use crate::outcome::{DispatchOutcome, HandlerOutcome, SKIP_FILTER_NOT_MATCHED};
use crate::runtime::HandlerRuntime;

/// Routes lifecycle events to registered handlers.
#[derive(Debug)]
pub struct Router {
    blueprint: Arc<Blueprint>,
    runtime: HandlerRuntime,
}

impl Router {
    /// Creates a router over an immutable blueprint.
    #[must_use]
    pub fn new(blueprint: Arc<Blueprint>) -> Self {
        Self {
            blueprint,
            runtime: HandlerRuntime::new(),
        }
    }

    /// The blueprint this router consults.
    #[must_use]
    pub fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }

    /// Dispatches one event, returning one outcome per registration whose
    /// trigger set contains the event's operation.
    ///
    /// Matching handlers run in registration order. A handler's failure or
    /// timeout never aborts its siblings; every selected registration reaches
    /// a terminal outcome.
    pub async fn dispatch(
        &self,
        event: DocumentEvent,
        ctx: HandlerContext,
    ) -> Vec<DispatchOutcome> {
        let event = Arc::new(event);
        let ctx = Arc::new(ctx);

        info!(
            event_id = %event.event_id,
            document_id = %event.document_id,
            document_type = %event.document_type,
            operation = %event.operation,
            "dispatching event"
        );

        let mut outcomes = Vec::new();
        for registration in self.blueprint.registrations() {
            if !registration.triggers_on(event.operation) {
                continue;
            }

            let matched = registration
                .filter
                .evaluate(&event.snapshot, event.previous_snapshot.as_ref());
            if !matched {
                debug!(
                    handler = %registration.name,
                    event_id = %event.event_id,
                    filter = %registration.filter,
                    "filter did not match"
                );
                outcomes.push(DispatchOutcome::new(
                    &registration.name,
                    HandlerOutcome::skipped(SKIP_FILTER_NOT_MATCHED),
                ));
                continue;
            }

            let outcome = self.runtime.invoke(registration, &event, &ctx).await;
            outcomes.push(DispatchOutcome::new(&registration.name, outcome));
        }

        info!(
            event_id = %event.event_id,
            selected = outcomes.len(),
            completed = outcomes.iter().filter(|o| o.outcome.is_completed()).count(),
            failed = outcomes.iter().filter(|o| o.outcome.is_failed()).count(),
            "dispatch finished"
        );

        outcomes
    }
}
