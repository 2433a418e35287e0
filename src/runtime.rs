//! The handler runtime: per-invocation timeout and failure isolation.
//!
//! Every invocation runs as its own task and terminates in exactly one
//! [`HandlerOutcome`]. Errors and panics are caught here and classified;
//! nothing propagates to the router or to sibling handlers. There is no
//! automatic retry: idempotent guard filters ("only act while the target
//! field is undefined") make the next matching event the retry path.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::blueprint::HandlerRegistration;
use crate::event::DocumentEvent;
use crate::handler::{HandlerContext, Resolution};
use crate::outcome::{ErrorKind, HandlerOutcome};

/// Executes handler invocations under timeout and isolation guarantees.
#[derive(Debug, Default, Clone, Copy)]
pub struct HandlerRuntime;

impl HandlerRuntime {
    /// Creates a runtime.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Invokes one registration's handler for one event.
    ///
    /// The handler runs as a spawned task raced against the registration's
    /// wall-clock budget. On expiry the task is abandoned, not rolled back:
    /// in-flight store writes complete or fail on their own, which is why
    /// handlers must keep each write self-consistent.
    pub async fn invoke(
        &self,
        registration: &HandlerRegistration,
        event: &Arc<DocumentEvent>,
        ctx: &Arc<HandlerContext>,
    ) -> HandlerOutcome {
        let handler = Arc::clone(&registration.handler);
        let event = Arc::clone(event);
        let ctx = Arc::clone(ctx);

        debug!(
            handler = %registration.name,
            event_id = %event.event_id,
            timeout_secs = registration.timeout.as_secs(),
            "invoking handler"
        );

        let task = tokio::spawn(async move { handler.handle(&event, &ctx).await });

        let outcome = match tokio::time::timeout(registration.timeout, task).await {
            Err(_) => HandlerOutcome::failed(
                ErrorKind::Timeout,
                format!(
                    "did not complete within {}s; invocation abandoned",
                    registration.timeout.as_secs()
                ),
            ),
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    HandlerOutcome::failed(ErrorKind::HandlerPanic, panic_detail(join_err))
                } else {
                    HandlerOutcome::failed(ErrorKind::Internal, "handler task was cancelled")
                }
            }
            Ok(Ok(Ok(Resolution::Done))) => HandlerOutcome::Completed,
            Ok(Ok(Ok(Resolution::Skipped { reason }))) => HandlerOutcome::skipped(reason),
            Ok(Ok(Err(handler_err))) => {
                HandlerOutcome::failed(handler_err.kind(), handler_err.to_string())
            }
        };

        if let HandlerOutcome::Failed { kind, detail } = &outcome {
            warn!(
                handler = %registration.name,
                kind = %kind,
                detail = %detail,
                "handler invocation failed"
            );
        }

        outcome
    }
}

fn panic_detail(join_err: tokio::task::JoinError) -> String {
    let payload = join_err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::error::HandlerError;
    use crate::event::{ClientOptions, DocumentId, Operation, Snapshot};
    use crate::handler::EventHandler;
    use crate::store::{
        ActionClient, ActionError, ActionRequest, ActionResponse, InMemoryDocumentStore,
    };

    struct NoopActions;

    #[async_trait]
    impl ActionClient for NoopActions {
        async fn call(&self, _request: ActionRequest) -> Result<ActionResponse, ActionError> {
            Ok(ActionResponse {
                payload: serde_json::Value::Null,
            })
        }
    }

    fn fixture() -> (Arc<DocumentEvent>, Arc<HandlerContext>) {
        let event = Arc::new(DocumentEvent::new(
            DocumentId::new("doc-1"),
            "page",
            Operation::Publish,
            Snapshot::new(),
        ));
        let ctx = Arc::new(HandlerContext::new(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(NoopActions),
            ClientOptions::default(),
        ));
        (event, ctx)
    }

    fn registration(
        name: &str,
        timeout: Duration,
        handler: Arc<dyn EventHandler>,
    ) -> HandlerRegistration {
        HandlerRegistration::new(name, handler)
            .on(Operation::Publish)
            .with_timeout(timeout)
    }

    struct Sleeper(Duration);

    #[async_trait]
    impl EventHandler for Sleeper {
        async fn handle(
            &self,
            _event: &DocumentEvent,
            _ctx: &HandlerContext,
        ) -> Result<Resolution, HandlerError> {
            tokio::time::sleep(self.0).await;
            Ok(Resolution::Done)
        }
    }

    struct Panicker;

    #[async_trait]
    impl EventHandler for Panicker {
        async fn handle(
            &self,
            _event: &DocumentEvent,
            _ctx: &HandlerContext,
        ) -> Result<Resolution, HandlerError> {
            panic!("boom");
        }
    }

    struct Failer;

    #[async_trait]
    impl EventHandler for Failer {
        async fn handle(
            &self,
            _event: &DocumentEvent,
            _ctx: &HandlerContext,
        ) -> Result<Resolution, HandlerError> {
            Err(HandlerError::ExternalAction {
                message: "503 from upstream".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn fast_handler_completes() {
        let (event, ctx) = fixture();
        let reg = registration(
            "fast",
            Duration::from_secs(5),
            Arc::new(Sleeper(Duration::from_millis(1))),
        );

        let outcome = HandlerRuntime::new().invoke(&reg, &event, &ctx).await;
        assert!(outcome.is_completed());
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        let (event, ctx) = fixture();
        let reg = registration(
            "slow",
            Duration::from_millis(20),
            Arc::new(Sleeper(Duration::from_secs(30))),
        );

        let outcome = HandlerRuntime::new().invoke(&reg, &event, &ctx).await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn panicking_handler_is_contained() {
        let (event, ctx) = fixture();
        let reg = registration("panics", Duration::from_secs(5), Arc::new(Panicker));

        let outcome = HandlerRuntime::new().invoke(&reg, &event, &ctx).await;
        let HandlerOutcome::Failed { kind, detail } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(kind, ErrorKind::HandlerPanic);
        assert!(detail.contains("boom"));
    }

    #[tokio::test]
    async fn handler_error_is_classified() {
        let (event, ctx) = fixture();
        let reg = registration("fails", Duration::from_secs(5), Arc::new(Failer));

        let outcome = HandlerRuntime::new().invoke(&reg, &event, &ctx).await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::ExternalAction));
    }

    #[tokio::test]
    async fn skipped_resolution_maps_to_skipped_outcome() {
        struct Skipper;

        #[async_trait]
        impl EventHandler for Skipper {
            async fn handle(
                &self,
                _event: &DocumentEvent,
                _ctx: &HandlerContext,
            ) -> Result<Resolution, HandlerError> {
                Ok(Resolution::skipped("already-defined"))
            }
        }

        let (event, ctx) = fixture();
        let reg = registration("skips", Duration::from_secs(5), Arc::new(Skipper));

        let outcome = HandlerRuntime::new().invoke(&reg, &event, &ctx).await;
        let HandlerOutcome::Skipped { reason } = outcome else {
            panic!("expected skipped");
        };
        assert_eq!(reason, "already-defined");
    }
}
