//! Derived-field generation.

use async_trait::async_trait;
use tracing::debug;

use crate::error::HandlerError;
use crate::event::DocumentEvent;
use crate::handler::{EventHandler, HandlerContext, Resolution};
use crate::store::GenerationRequest;

use super::stamp::SKIP_ALREADY_DEFINED;

/// Populates a target field by running a templated generation instruction
/// against the document, but only while the target is still undefined.
///
/// The undefined-target guard is what makes failures self-healing: when the
/// generation action fails, the target stays undefined, so the next matching
/// event retries naturally. Once a value lands, later events skip.
#[derive(Debug, Clone)]
pub struct GenerateFieldHandler {
    target_path: String,
    instruction: String,
    param_bindings: Vec<(String, String)>,
}

impl GenerateFieldHandler {
    /// Creates a generator writing `instruction`'s result to `target_path`.
    #[must_use]
    pub fn new(target_path: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            target_path: target_path.into(),
            instruction: instruction.into(),
            param_bindings: Vec::new(),
        }
    }

    /// Binds `$name` in the instruction to a document field path.
    #[must_use]
    pub fn bind_field(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.param_bindings.push((name.into(), path.into()));
        self
    }
}

#[async_trait]
impl EventHandler for GenerateFieldHandler {
    async fn handle(
        &self,
        event: &DocumentEvent,
        ctx: &HandlerContext,
    ) -> Result<Resolution, HandlerError> {
        // Guard re-check against the live store; the routing filter saw a
        // point-in-time snapshot.
        let current = ctx
            .store
            .read_field(&event.document_id, &self.target_path)
            .await?;
        if matches!(current, Some(v) if !v.is_null()) {
            return Ok(Resolution::skipped(SKIP_ALREADY_DEFINED));
        }

        let mut request = GenerationRequest::new(
            event.document_id.clone(),
            self.instruction.clone(),
            self.target_path.clone(),
        );
        for (name, path) in &self.param_bindings {
            request = request.bind_field(name.clone(), path.clone());
        }

        let result = ctx.store.run_generation_action(request).await?;
        debug!(
            document_id = %event.document_id,
            target = %self.target_path,
            value_type = result.value.type_name(),
            "generation action wrote derived field"
        );

        Ok(Resolution::Done)
    }
}
