//! Handler registry for TaskForge.
//!
//! The registry maps a task's type tag to the handler that executes it.
//! New task types are added by registering a handler, never by touching the
//! dispatch code.
//!
//! # Overview
//!
//! - `TaskHandler` trait: executes the payload of one task type
//! - `HandlerRegistryBuilder`: collects handlers before the pool starts
//! - `HandlerRegistry`: immutable lookup table plus the dispatch policy
//!
//! # Examples
//!
//! ```rust
//! use taskforge::prelude::*;
//!
//! struct Ping;
//!
//! #[async_trait]
//! impl TaskHandler for Ping {
//!     async fn execute(&self, _payload: &Payload) -> Result<(), ProcessingError> {
//!         Ok(())
//!     }
//! }
//!
//! let registry = HandlerRegistry::builder().register("ping", Ping).build();
//! assert!(registry.is_registered("ping"));
//! ```

use crate::error::ProcessingError;
use crate::task::{Payload, Task};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Executes tasks of one type.
///
/// Handlers are invoked inline by the dispatching worker and only ever see
/// non-empty payloads.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the task.
    async fn execute(&self, payload: &Payload) -> Result<(), ProcessingError>;
}

/// Collects handlers before the registry is frozen.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistryBuilder {
    /// Register `handler` under `task_type`, replacing any earlier one.
    pub fn register<H>(mut self, task_type: impl Into<String>, handler: H) -> Self
    where
        H: TaskHandler + 'static,
    {
        let task_type = task_type.into();
        tracing::debug!("Registering task handler: {}", task_type);

        if self
            .handlers
            .insert(task_type.clone(), Arc::new(handler))
            .is_some()
        {
            tracing::warn!("Handler for '{}' replaced", task_type);
        }
        self
    }

    /// Freeze the registry.
    pub fn build(self) -> HandlerRegistry {
        tracing::info!("Handler registry built with {} types", self.handlers.len());
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

/// Immutable map from type tag to handler.
///
/// Shared by every worker without locking; the registry performs no I/O
/// itself.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("task_types", &self.registered_types())
            .finish()
    }
}

impl HandlerRegistry {
    /// Start building a registry.
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// Validate the task and run its handler.
    ///
    /// Checks, in order: an absent or empty payload fails with
    /// [`ProcessingError::EmptyPayload`], an empty type tag with
    /// [`ProcessingError::EmptyType`], an unregistered tag with
    /// [`ProcessingError::UnsupportedType`].
    pub async fn dispatch(&self, task: &Task) -> Result<(), ProcessingError> {
        let payload = match task.payload.as_ref() {
            Some(payload) if !payload.is_empty() => payload,
            _ => return Err(ProcessingError::EmptyPayload),
        };

        if task.task_type.is_empty() {
            return Err(ProcessingError::EmptyType);
        }

        let handler = self.handlers.get(&task.task_type).ok_or_else(|| {
            ProcessingError::UnsupportedType {
                task_type: task.task_type.clone(),
            }
        })?;

        tracing::debug!("Dispatching task of type {}", task.task_type);
        handler.execute(payload).await
    }

    /// Check if a task type is registered.
    pub fn is_registered(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// Get all registered task types, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
