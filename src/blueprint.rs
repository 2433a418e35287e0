//! The blueprint: load-time handler registrations.
//!
//! A blueprint is the ordered, immutable set of handler bindings. It is
//! loaded once at process start and read-only thereafter; running handlers
//! never mutate it. Registration order defines dispatch order for handlers
//! matching the same event.
//!
//! Declarative configuration is a JSON array of entries:
//!
//! ```json
//! [{
//!   "name": "auto-summary",
//!   "src": "generate-summary",
//!   "timeout": 30,
//!   "event": {
//!     "on": ["publish"],
//!     "filter": "_type == \"page\" && !defined(autoSummary)"
//!   }
//! }]
//! ```
//!
//! All configuration problems (duplicate names, malformed filters, unknown
//! handler references, missing fields) are fatal at load time.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::event::Operation;
use crate::filter::FilterPredicate;
use crate::handler::EventHandler;

/// Default per-invocation timeout when a blueprint entry omits one. Slow
/// handlers (generation calls) should set a larger budget explicitly.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// One registered (handler, trigger-event-set, filter, timeout) tuple.
#[derive(Clone)]
pub struct HandlerRegistration {
    /// Unique name within the blueprint.
    pub name: String,
    /// Lifecycle operations that trigger evaluation.
    pub trigger_operations: BTreeSet<Operation>,
    /// Routing predicate evaluated against the event snapshot.
    pub filter: FilterPredicate,
    /// Wall-clock budget for one invocation.
    pub timeout: Duration,
    /// The handler implementation to invoke.
    pub handler: Arc<dyn EventHandler>,
}

impl HandlerRegistration {
    /// Starts a registration with the default timeout and an always-matching
    /// filter.
    #[must_use]
    pub fn new(name: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            name: name.into(),
            trigger_operations: BTreeSet::new(),
            filter: FilterPredicate::always(),
            timeout: DEFAULT_TIMEOUT,
            handler,
        }
    }

    /// Adds a trigger operation.
    #[must_use]
    pub fn on(mut self, operation: Operation) -> Self {
        self.trigger_operations.insert(operation);
        self
    }

    /// Sets the filter predicate.
    #[must_use]
    pub fn with_filter(mut self, filter: FilterPredicate) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the invocation timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// True when this registration triggers on the given operation.
    #[must_use]
    pub fn triggers_on(&self, operation: Operation) -> bool {
        self.trigger_operations.contains(&operation)
    }
}

impl fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("name", &self.name)
            .field("trigger_operations", &self.trigger_operations)
            .field("filter", &self.filter.to_string())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// The immutable, ordered registry of handler registrations.
#[derive(Debug, Default)]
pub struct Blueprint {
    entries: Vec<HandlerRegistration>,
}

impl Blueprint {
    /// Creates an empty blueprint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a registration, preserving order.
    ///
    /// # Errors
    /// - [`ConfigError::DuplicateRegistration`] for a reused name
    /// - [`ConfigError::EmptyTriggerSet`] when no operation triggers it
    /// - [`ConfigError::ZeroTimeout`] for a zero budget
    pub fn register(&mut self, registration: HandlerRegistration) -> Result<(), ConfigError> {
        if self.entries.iter().any(|e| e.name == registration.name) {
            return Err(ConfigError::DuplicateRegistration {
                name: registration.name,
            });
        }
        if registration.trigger_operations.is_empty() {
            return Err(ConfigError::EmptyTriggerSet {
                name: registration.name,
            });
        }
        if registration.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                name: registration.name,
            });
        }
        self.entries.push(registration);
        Ok(())
    }

    /// All registrations in registration order.
    #[must_use]
    pub fn registrations(&self) -> &[HandlerRegistration] {
        &self.entries
    }

    /// Looks up a registration by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&HandlerRegistration> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds a blueprint from declarative configuration, resolving each
    /// entry's `src` against the named handler implementations.
    ///
    /// # Errors
    /// Any [`ConfigError`]; the process must not start on failure.
    pub fn from_config(
        configs: Vec<RegistrationConfig>,
        handlers: &BTreeMap<String, Arc<dyn EventHandler>>,
    ) -> Result<Self, ConfigError> {
        let mut blueprint = Self::new();
        for config in configs {
            let handler = handlers
                .get(&config.src)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownHandler {
                    name: config.name.clone(),
                    src: config.src.clone(),
                })?;

            let filter = match &config.event.filter {
                Some(source) => FilterPredicate::parse(source).map_err(|e| {
                    ConfigError::MalformedFilter {
                        name: config.name.clone(),
                        detail: e.to_string(),
                    }
                })?,
                None => FilterPredicate::always(),
            };

            let mut registration = HandlerRegistration::new(config.name, handler)
                .with_filter(filter);
            if let Some(seconds) = config.timeout {
                registration = registration.with_timeout(Duration::from_secs(seconds));
            }
            for op in config.event.on {
                registration = registration.on(op);
            }

            blueprint.register(registration)?;
        }
        Ok(blueprint)
    }

    /// Parses a JSON blueprint document and builds the registry.
    ///
    /// # Errors
    /// [`ConfigError::Parse`] for malformed JSON or missing required fields,
    /// plus everything [`Blueprint::from_config`] reports.
    pub fn from_json(
        raw: &str,
        handlers: &BTreeMap<String, Arc<dyn EventHandler>>,
    ) -> Result<Self, ConfigError> {
        let configs: Vec<RegistrationConfig> =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse {
                detail: e.to_string(),
            })?;
        Self::from_config(configs, handlers)
    }
}

/// One declarative blueprint entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrationConfig {
    /// Unique registration name.
    pub name: String,
    /// Name of the handler implementation to invoke.
    pub src: String,
    /// Seconds before the runtime abandons the invocation.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Trigger condition.
    pub event: EventConfig,
}

/// The `event` member of a blueprint entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventConfig {
    /// Lifecycle operations that trigger evaluation.
    pub on: Vec<Operation>,
    /// Filter expression string; omitted means match everything.
    #[serde(default)]
    pub filter: Option<String>,
}
