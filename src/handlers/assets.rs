//! Read-only observation of asset documents.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::error::HandlerError;
use crate::event::{DocumentEvent, DocumentId, Operation};
use crate::handler::{EventHandler, HandlerContext, Resolution};

/// Skip reason reported when the event carries no asset metadata.
pub const SKIP_NO_ASSET_METADATA: &str = "no-asset-metadata";

/// One observed asset event.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetObservation {
    /// The asset document.
    pub document_id: DocumentId,
    /// The lifecycle operation observed.
    pub operation: Operation,
    /// Asset URL, when present in the snapshot.
    pub url: Option<String>,
    /// MIME type, when present.
    pub mime_type: Option<String>,
    /// Size in bytes, when present.
    pub size: Option<i64>,
}

/// Observes asset document lifecycle events without writing anything back.
///
/// Deletes carry no snapshot worth reading, so the observer records identity
/// only for them. All other operations require at least one metadata field;
/// an asset-typed document with none is skipped rather than recorded empty.
///
/// Observations accumulate in memory; a host drains them with
/// [`AssetObserver::take_observations`] and forwards them wherever audit
/// records go.
#[derive(Debug, Default)]
pub struct AssetObserver {
    observations: Mutex<Vec<AssetObservation>>,
}

impl AssetObserver {
    /// Creates an observer with an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains and returns everything observed so far.
    #[must_use]
    pub fn take_observations(&self) -> Vec<AssetObservation> {
        std::mem::take(
            &mut *self
                .observations
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        )
    }

    fn record(&self, observation: AssetObservation) {
        self.observations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(observation);
    }
}

#[async_trait]
impl EventHandler for AssetObserver {
    async fn handle(
        &self,
        event: &DocumentEvent,
        _ctx: &HandlerContext,
    ) -> Result<Resolution, HandlerError> {
        let url = event
            .snapshot
            .get_path("url")
            .and_then(|v| v.as_string().map(ToString::to_string));
        let mime_type = event
            .snapshot
            .get_path("mimeType")
            .and_then(|v| v.as_string().map(ToString::to_string));
        let size = event.snapshot.get_path("size").and_then(|v| v.as_int());

        if event.operation != Operation::Delete
            && url.is_none()
            && mime_type.is_none()
            && size.is_none()
        {
            return Ok(Resolution::skipped(SKIP_NO_ASSET_METADATA));
        }

        info!(
            document_id = %event.document_id,
            operation = %event.operation,
            url = url.as_deref().unwrap_or("-"),
            "observed asset event"
        );
        self.record(AssetObservation {
            document_id: event.document_id.clone(),
            operation: event.operation,
            url,
            mime_type,
            size,
        });

        Ok(Resolution::Done)
    }
}
