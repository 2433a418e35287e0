//! Outbound synchronization to an external system.

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::error::HandlerError;
use crate::event::DocumentEvent;
use crate::handler::{EventHandler, HandlerContext, Resolution};
use crate::store::ActionRequest;

/// Pushes a document's state to an external endpoint on each matching event.
///
/// The payload carries the event's snapshot (optionally restricted to a
/// projection of fields) plus identity metadata, so the receiver can upsert
/// without a read-back. Sync is at-least-once: the same document state may be
/// delivered more than once, and receivers are expected to key on the
/// document id.
#[derive(Debug, Clone)]
pub struct ExternalSyncHandler {
    endpoint: String,
    projection: Option<Vec<String>>,
}

impl ExternalSyncHandler {
    /// Creates a sync handler targeting a logical endpoint name.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            projection: None,
        }
    }

    /// Restricts the synced payload to the named top-level fields. Absent
    /// fields are omitted, not sent as null.
    #[must_use]
    pub fn with_projection(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    fn payload(&self, event: &DocumentEvent) -> serde_json::Value {
        let fields: serde_json::Map<String, serde_json::Value> = match &self.projection {
            Some(projection) => projection
                .iter()
                .filter_map(|name| {
                    event
                        .snapshot
                        .get_path(name)
                        .map(|v| (name.clone(), serde_json::Value::from(v)))
                })
                .collect(),
            None => event
                .snapshot
                .iter()
                .map(|(name, value)| (name.clone(), serde_json::Value::from(value)))
                .collect(),
        };

        json!({
            "documentId": event.document_id.as_str(),
            "documentType": event.document_type,
            "operation": event.operation,
            "fields": serde_json::Value::Object(fields),
        })
    }
}

#[async_trait]
impl EventHandler for ExternalSyncHandler {
    async fn handle(
        &self,
        event: &DocumentEvent,
        ctx: &HandlerContext,
    ) -> Result<Resolution, HandlerError> {
        let request = ActionRequest::new(self.endpoint.clone(), self.payload(event));

        match ctx.actions.call(request).await {
            Ok(_) => Ok(Resolution::Done),
            Err(err) => {
                warn!(
                    endpoint = %self.endpoint,
                    document_id = %event.document_id,
                    transient = err.is_transient(),
                    "external sync failed"
                );
                Err(err.into())
            }
        }
    }
}
