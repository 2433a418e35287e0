//! In-memory document store backend.
//!
//! Backs unit and end-to-end tests and embedded use without a real content
//! store. Patches are applied atomically under one lock, each commit bumps a
//! per-document revision, and the generation action derives the rendered
//! instruction as its value so tests get deterministic output.
//!
//! The fake also exposes failure injection (`inject_commit_conflict`,
//! `inject_generation_failure`) so partial-failure paths can be exercised.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::event::{DocumentId, Snapshot};
use crate::value::FieldValue;

use super::traits::{
    CommitAck, CommitOptions, DocumentStore, GenerationRequest, GenerationResult, ParamBinding,
    Patch, StoreError,
};

#[derive(Debug, Clone)]
struct StoredDocument {
    fields: BTreeMap<String, FieldValue>,
    revision: u64,
}

#[derive(Debug, Default)]
struct Inner {
    documents: BTreeMap<DocumentId, StoredDocument>,
    pending_commit_conflict: Option<String>,
    pending_generation_failure: Option<String>,
}

/// In-memory [`DocumentStore`] implementation.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    inner: Mutex<Inner>,
    generation_calls: AtomicU64,
}

impl InMemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a document from a JSON object.
    ///
    /// # Panics
    /// Panics when `fields` is not a JSON object; the fake is only ever
    /// seeded from literal fixtures.
    pub fn put_document(&self, id: DocumentId, fields: serde_json::Value) {
        let FieldValue::Object(map) = FieldValue::from(fields) else {
            panic!("document fields must be a JSON object");
        };
        let mut inner = self.lock();
        let revision = inner.documents.get(&id).map_or(1, |d| d.revision + 1);
        inner.documents.insert(
            id,
            StoredDocument {
                fields: map,
                revision,
            },
        );
    }

    /// Returns the current snapshot of a document, for re-dispatch in tests.
    #[must_use]
    pub fn snapshot(&self, id: &DocumentId) -> Option<Snapshot> {
        self.lock()
            .documents
            .get(id)
            .map(|d| Snapshot::from(d.fields.clone()))
    }

    /// Returns the current revision of a document.
    #[must_use]
    pub fn revision(&self, id: &DocumentId) -> Option<u64> {
        self.lock().documents.get(id).map(|d| d.revision)
    }

    /// Makes the next `commit_patch` fail with a conflict.
    pub fn inject_commit_conflict(&self, detail: impl Into<String>) {
        self.lock().pending_commit_conflict = Some(detail.into());
    }

    /// Makes the next `run_generation_action` fail.
    pub fn inject_generation_failure(&self, detail: impl Into<String>) {
        self.lock().pending_generation_failure = Some(detail.into());
    }

    /// Number of generation actions attempted (including injected failures).
    #[must_use]
    pub fn generation_calls(&self) -> u64 {
        self.generation_calls.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panic mid-mutation in this process; the
        // fake's state is still structurally valid, so keep going.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn get_path<'a>(fields: &'a BTreeMap<String, FieldValue>, path: &str) -> Option<&'a FieldValue> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = fields.get(first)?;
    for seg in segments {
        current = current.as_object()?.get(seg)?;
    }
    Some(current)
}

fn set_path(
    fields: &mut BTreeMap<String, FieldValue>,
    path: &str,
    value: FieldValue,
) -> Result<(), StoreError> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments.pop().ok_or_else(|| {
        StoreError::Serialization(format!("empty patch path: {path:?}"))
    })?;

    let mut current = fields;
    for seg in segments {
        let entry = current
            .entry(seg.to_string())
            .or_insert_with(|| FieldValue::Object(BTreeMap::new()));
        match entry {
            FieldValue::Object(map) => current = map,
            other => {
                return Err(StoreError::Serialization(format!(
                    "patch path {path:?} descends through {} at '{seg}'",
                    other.type_name()
                )))
            }
        }
    }
    current.insert(last.to_string(), value);
    Ok(())
}

fn render_instruction(
    instruction: &str,
    params: &BTreeMap<String, ParamBinding>,
    fields: &BTreeMap<String, FieldValue>,
) -> Result<String, StoreError> {
    let mut rendered = instruction.to_string();
    for (name, binding) in params {
        let ParamBinding::Field { path } = binding;
        let value = get_path(fields, path).ok_or_else(|| StoreError::ActionFailed {
            detail: format!("instruction parameter '{name}' is bound to undefined field '{path}'"),
        })?;
        let text = match value {
            FieldValue::String(s) => s.clone(),
            other => other.to_string(),
        };
        rendered = rendered.replace(&format!("${name}"), &text);
    }
    Ok(rendered)
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn read_field(
        &self,
        document_id: &DocumentId,
        path: &str,
    ) -> Result<Option<FieldValue>, StoreError> {
        let inner = self.lock();
        let doc = inner
            .documents
            .get(document_id)
            .ok_or_else(|| StoreError::DocumentNotFound(document_id.clone()))?;
        Ok(get_path(&doc.fields, path).cloned())
    }

    async fn commit_patch(
        &self,
        document_id: &DocumentId,
        patch: Patch,
        _opts: CommitOptions,
    ) -> Result<CommitAck, StoreError> {
        let mut inner = self.lock();

        if let Some(detail) = inner.pending_commit_conflict.take() {
            return Err(StoreError::Conflict {
                document_id: document_id.clone(),
                detail,
            });
        }

        let doc = inner
            .documents
            .get_mut(document_id)
            .ok_or_else(|| StoreError::DocumentNotFound(document_id.clone()))?;

        // Apply to a working copy so a bad path leaves the document untouched.
        let mut working = doc.fields.clone();
        for (path, value) in patch.set {
            set_path(&mut working, &path, value)?;
        }
        doc.fields = working;
        doc.revision += 1;

        Ok(CommitAck {
            document_id: document_id.clone(),
            revision: doc.revision,
        })
    }

    async fn run_generation_action(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResult, StoreError> {
        self.generation_calls.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.lock();

        if let Some(detail) = inner.pending_generation_failure.take() {
            return Err(StoreError::ActionFailed { detail });
        }

        let doc = inner
            .documents
            .get(&request.document_id)
            .ok_or_else(|| StoreError::DocumentNotFound(request.document_id.clone()))?;

        let rendered =
            render_instruction(&request.instruction, &request.instruction_params, &doc.fields)?;
        let value = FieldValue::String(rendered);

        let doc = inner
            .documents
            .get_mut(&request.document_id)
            .ok_or_else(|| StoreError::DocumentNotFound(request.document_id.clone()))?;
        set_path(&mut doc.fields, &request.target_path, value.clone())?;
        doc.revision += 1;

        Ok(GenerationResult { value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_page() -> (InMemoryDocumentStore, DocumentId) {
        let store = InMemoryDocumentStore::new();
        let id = DocumentId::new("page-1");
        store.put_document(
            id.clone(),
            serde_json::json!({
                "_id": "page-1",
                "_type": "page",
                "title": "Hello",
                "body": "Some body text",
                "meta": {"lang": "en"}
            }),
        );
        (store, id)
    }

    #[tokio::test]
    async fn read_field_returns_value_or_none() {
        let (store, id) = store_with_page();

        let title = store.read_field(&id, "title").await.unwrap();
        assert_eq!(title, Some(FieldValue::String("Hello".into())));

        let nested = store.read_field(&id, "meta.lang").await.unwrap();
        assert_eq!(nested, Some(FieldValue::String("en".into())));

        let absent = store.read_field(&id, "autoSummary").await.unwrap();
        assert_eq!(absent, None);
    }

    #[tokio::test]
    async fn read_field_unknown_document_errors() {
        let store = InMemoryDocumentStore::new();
        let err = store
            .read_field(&DocumentId::new("ghost"), "title")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn commit_patch_applies_atomically_and_bumps_revision() {
        let (store, id) = store_with_page();
        let before = store.revision(&id).unwrap();

        let ack = store
            .commit_patch(
                &id,
                Patch::new()
                    .set("publishedAt", "2024-06-01T00:00:00Z")
                    .set("meta.reviewed", true),
                CommitOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(ack.revision, before + 1);
        let snap = store.snapshot(&id).unwrap();
        assert!(snap.is_defined("publishedAt"));
        assert_eq!(snap.get_path("meta.reviewed"), Some(&FieldValue::Bool(true)));
    }

    #[tokio::test]
    async fn commit_patch_bad_path_leaves_document_untouched() {
        let (store, id) = store_with_page();
        let before = store.snapshot(&id).unwrap();

        // `title` is a string; descending through it must fail.
        let err = store
            .commit_patch(
                &id,
                Patch::new().set("title.sub", 1i64).set("other", 2i64),
                CommitOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
        assert_eq!(store.snapshot(&id).unwrap(), before);
    }

    #[tokio::test]
    async fn injected_conflict_fails_one_commit() {
        let (store, id) = store_with_page();
        store.inject_commit_conflict("concurrent publish");

        let err = store
            .commit_patch(
                &id,
                Patch::new().set("publishedAt", "now"),
                CommitOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        // The injection is one-shot.
        store
            .commit_patch(
                &id,
                Patch::new().set("publishedAt", "now"),
                CommitOptions::default(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn generation_renders_instruction_and_writes_target() {
        let (store, id) = store_with_page();

        let result = store
            .run_generation_action(
                GenerationRequest::new(id.clone(), "Summarize: $body", "autoSummary")
                    .bind_field("body", "body"),
            )
            .await
            .unwrap();

        assert_eq!(
            result.value,
            FieldValue::String("Summarize: Some body text".into())
        );
        let snap = store.snapshot(&id).unwrap();
        assert_eq!(snap.get_path("autoSummary"), Some(&result.value));
        assert_eq!(store.generation_calls(), 1);
    }

    #[tokio::test]
    async fn generation_with_undefined_source_fails_and_writes_nothing() {
        let (store, id) = store_with_page();

        let err = store
            .run_generation_action(
                GenerationRequest::new(id.clone(), "Summarize: $missing", "autoSummary")
                    .bind_field("missing", "nope"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ActionFailed { .. }));
        assert!(!store.snapshot(&id).unwrap().is_defined("autoSummary"));
    }

    #[tokio::test]
    async fn injected_generation_failure_leaves_target_undefined() {
        let (store, id) = store_with_page();
        store.inject_generation_failure("upstream 503");

        let err = store
            .run_generation_action(
                GenerationRequest::new(id.clone(), "Summarize: $body", "autoSummary")
                    .bind_field("body", "body"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ActionFailed { .. }));
        assert!(!store.snapshot(&id).unwrap().is_defined("autoSummary"));
        assert_eq!(store.generation_calls(), 1);
    }
}
