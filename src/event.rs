//! Lifecycle events and the host wire envelope.
//!
//! The engine is invoked once per inbound lifecycle event. Events are
//! immutable once dispatched: handlers never mutate the event object, only
//! the underlying document store through explicit write operations.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DecodeError;
use crate::value::FieldValue;

/// Opaque unique identifier of a content document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Wraps a raw identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(v: &str) -> Self {
        Self(v.to_string())
    }
}

/// Unique identifier assigned to one dispatched event, used in logging and
/// outcome reporting.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Create a new random event id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Enumerated lifecycle operation on a content document.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Publish,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Publish => write!(f, "publish"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// A document's field values at the time of an operation.
///
/// A snapshot is not necessarily the full document; depending on the source
/// it may be partial. Lookup distinguishes "present" from "defined": a field
/// holding an explicit `null` is present but not defined, which is what the
/// `defined(...)` filter test checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, FieldValue>);

impl Snapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts a field value, replacing any existing value.
    pub fn insert(&mut self, path: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(path.into(), value.into());
    }

    /// Looks up a field by dotted path (`author.name` descends into nested
    /// objects). Returns `None` when any path segment is absent.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&FieldValue> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for seg in segments {
            current = current.as_object()?.get(seg)?;
        }
        Some(current)
    }

    /// Returns true if the path resolves to a value that is not `Null`.
    #[must_use]
    pub fn is_defined(&self, path: &str) -> bool {
        self.get_path(path).is_some_and(|v| !v.is_null())
    }

    /// Number of top-level fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the snapshot carries no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over top-level fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }
}

impl From<BTreeMap<String, FieldValue>> for Snapshot {
    fn from(map: BTreeMap<String, FieldValue>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, FieldValue)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// An immutable record describing a state transition on a content document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEvent {
    /// Identifier assigned when the event was decoded.
    pub event_id: EventId,
    /// The affected document.
    pub document_id: DocumentId,
    /// Discriminator naming the document's schema/variant.
    pub document_type: String,
    /// The lifecycle operation that produced this event.
    pub operation: Operation,
    /// Field values at the time of the operation.
    pub snapshot: Snapshot,
    /// Prior state, when the source supplies it. Used by filters that compare
    /// before/after.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_snapshot: Option<Snapshot>,
}

impl DocumentEvent {
    /// Builds an event directly from parts. The wire path goes through
    /// [`EventEnvelope::into_event`] instead.
    #[must_use]
    pub fn new(
        document_id: DocumentId,
        document_type: impl Into<String>,
        operation: Operation,
        snapshot: Snapshot,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            document_id,
            document_type: document_type.into(),
            operation,
            snapshot,
            previous_snapshot: None,
        }
    }

    /// Attaches a prior-state snapshot.
    #[must_use]
    pub fn with_previous(mut self, previous: Snapshot) -> Self {
        self.previous_snapshot = Some(previous);
        self
    }
}

/// Per-invocation client options supplied by the host.
///
/// The engine treats these opaquely and forwards them unchanged to the
/// document store client for that invocation; they are credential/connection
/// scoping, never global state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientOptions(serde_json::Value);

impl ClientOptions {
    /// Wraps a raw options payload.
    #[must_use]
    pub const fn new(raw: serde_json::Value) -> Self {
        Self(raw)
    }

    /// The raw payload, for store client implementations that scope
    /// themselves from it.
    #[must_use]
    pub const fn raw(&self) -> &serde_json::Value {
        &self.0
    }
}

/// The wire shape the host delivers:
/// `{ "context": { "clientOptions": ... }, "event": { "data": {...}, "on": op } }`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    /// Invocation context.
    #[serde(default)]
    pub context: InvocationContext,
    /// The event body.
    pub event: EventBody,
}

/// Invocation-scoped context from the host.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvocationContext {
    /// Opaque per-invocation client options.
    #[serde(rename = "clientOptions", default)]
    pub client_options: ClientOptions,
}

/// The `event` member of the wire envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct EventBody {
    /// Document field values, including `_id` and `_type`.
    pub data: serde_json::Value,
    /// The lifecycle operation.
    pub on: Operation,
    /// Prior document state, when supplied.
    #[serde(default)]
    pub before: Option<serde_json::Value>,
}

impl EventEnvelope {
    /// Decodes an envelope from raw JSON.
    ///
    /// # Errors
    /// Returns [`DecodeError`] when the payload does not match the wire shape.
    pub fn from_json(raw: &serde_json::Value) -> Result<Self, DecodeError> {
        serde_json::from_value(raw.clone()).map_err(|e| DecodeError::Envelope {
            detail: e.to_string(),
        })
    }

    /// Splits the envelope into the immutable event and the opaque client
    /// options for the invocation.
    ///
    /// # Errors
    /// Returns [`DecodeError`] when `data` is not an object or lacks the
    /// `_id`/`_type` discriminator fields.
    pub fn into_event(self) -> Result<(DocumentEvent, ClientOptions), DecodeError> {
        let data = snapshot_from_data(self.event.data)?;

        let document_id = match data.get_path("_id") {
            Some(FieldValue::String(id)) if !id.is_empty() => DocumentId::new(id.clone()),
            _ => {
                return Err(DecodeError::MissingField {
                    field: "_id".to_string(),
                })
            }
        };
        let document_type = match data.get_path("_type") {
            Some(FieldValue::String(t)) if !t.is_empty() => t.clone(),
            _ => {
                return Err(DecodeError::MissingField {
                    field: "_type".to_string(),
                })
            }
        };

        let previous = match self.event.before {
            Some(raw) => Some(snapshot_from_data(raw)?),
            None => None,
        };

        let mut event = DocumentEvent::new(document_id, document_type, self.event.on, data);
        event.previous_snapshot = previous;

        Ok((event, self.context.client_options))
    }
}

fn snapshot_from_data(data: serde_json::Value) -> Result<Snapshot, DecodeError> {
    match FieldValue::from(data) {
        FieldValue::Object(map) => Ok(Snapshot::from(map)),
        other => Err(DecodeError::DataNotObject {
            actual: other.type_name(),
        }),
    }
}
