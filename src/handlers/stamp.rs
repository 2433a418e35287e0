//! First-publish timestamp stamping.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};

use crate::error::HandlerError;
use crate::event::DocumentEvent;
use crate::handler::{EventHandler, HandlerContext, Resolution};
use crate::store::{CommitOptions, Patch};
use crate::value::FieldValue;

/// Skip reason reported when the target field already holds a value.
pub const SKIP_ALREADY_DEFINED: &str = "already-defined";

/// Writes the current UTC time into a field the first time a document is
/// published, and never overwrites it afterwards.
///
/// Pair this with a `!defined(<field>)` filter so repeat publishes skip
/// cheaply at routing time. The handler still re-reads the field from the
/// live store before writing: the event snapshot is a point-in-time copy, and
/// a sibling writer may have stamped the document since.
#[derive(Debug, Clone)]
pub struct PublishStampHandler {
    target_path: String,
    force_published_write: bool,
}

impl PublishStampHandler {
    /// Creates a stamper writing to `target_path` (e.g. `"publishedAt"`).
    #[must_use]
    pub fn new(target_path: impl Into<String>) -> Self {
        Self {
            target_path: target_path.into(),
            force_published_write: true,
        }
    }

    /// Controls whether the write targets the published document even when
    /// the store is scoped to a draft context. Defaults to `true`; the stamp
    /// belongs on the published document.
    #[must_use]
    pub const fn force_published_write(mut self, force: bool) -> Self {
        self.force_published_write = force;
        self
    }
}

#[async_trait]
impl EventHandler for PublishStampHandler {
    async fn handle(
        &self,
        event: &DocumentEvent,
        ctx: &HandlerContext,
    ) -> Result<Resolution, HandlerError> {
        let current = ctx
            .store
            .read_field(&event.document_id, &self.target_path)
            .await?;
        if matches!(current, Some(v) if !v.is_null()) {
            return Ok(Resolution::skipped(SKIP_ALREADY_DEFINED));
        }

        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let patch = Patch::new().set(&self.target_path, FieldValue::String(stamp));
        let opts = CommitOptions {
            force_published_write: self.force_published_write,
        };
        ctx.store
            .commit_patch(&event.document_id, patch, opts)
            .await?;

        Ok(Resolution::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::event::{ClientOptions, DocumentId, Operation, Snapshot};
    use crate::outcome::ErrorKind;
    use crate::store::{
        ActionClient, ActionError, ActionRequest, ActionResponse, DocumentStore,
        InMemoryDocumentStore,
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

    fn ctx(store: Arc<InMemoryDocumentStore>) -> HandlerContext {
        HandlerContext::new(store, Arc::new(NoopActions), ClientOptions::default())
    }

    fn publish_event(id: &str) -> DocumentEvent {
        DocumentEvent::new(DocumentId::new(id), "post", Operation::Publish, Snapshot::new())
    }

    #[tokio::test]
    async fn stamps_undefined_field() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.put_document(DocumentId::new("doc-1"), serde_json::json!({"title": "hello"}));

        let handler = PublishStampHandler::new("publishedAt");
        let resolution = handler
            .handle(&publish_event("doc-1"), &ctx(Arc::clone(&store)))
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Done);

        let stamped = store
            .read_field(&DocumentId::new("doc-1"), "publishedAt")
            .await
            .unwrap()
            .unwrap();
        let FieldValue::String(ts) = stamped else {
            panic!("expected a string timestamp");
        };
        // RFC 3339 with a Z suffix.
        assert!(ts.ends_with('Z'), "unexpected timestamp format: {ts}");
    }

    #[tokio::test]
    async fn skips_when_already_stamped() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.put_document(
            DocumentId::new("doc-1"),
            serde_json::json!({"publishedAt": "2024-06-01T00:00:00Z"}),
        );
        let before = store.revision(&DocumentId::new("doc-1")).unwrap();

        let handler = PublishStampHandler::new("publishedAt");
        let resolution = handler
            .handle(&publish_event("doc-1"), &ctx(Arc::clone(&store)))
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::skipped(SKIP_ALREADY_DEFINED));
        assert_eq!(store.revision(&DocumentId::new("doc-1")).unwrap(), before);
    }

    #[tokio::test]
    async fn null_field_is_treated_as_unstamped() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.put_document(
            DocumentId::new("doc-1"),
            serde_json::json!({"publishedAt": null}),
        );

        let handler = PublishStampHandler::new("publishedAt");
        let resolution = handler
            .handle(&publish_event("doc-1"), &ctx(Arc::clone(&store)))
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Done);
    }

    #[tokio::test]
    async fn write_conflict_maps_to_conflict_error() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.put_document(DocumentId::new("doc-1"), serde_json::json!({}));
        store.inject_commit_conflict("revision mismatch");

        let handler = PublishStampHandler::new("publishedAt");
        let err = handler
            .handle(&publish_event("doc-1"), &ctx(Arc::clone(&store)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
