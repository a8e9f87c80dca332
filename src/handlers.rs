//! Built-in demo handlers.
//!
//! They only log what a real implementation would do. Register them all with
//! [`register_builtin`], or pick individual ones.

use crate::core::registry::{HandlerRegistryBuilder, TaskHandler};
use crate::error::ProcessingError;
use crate::task::Payload;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::info;

/// Default simulated latency of [`SendEmail`].
pub const DEFAULT_EMAIL_LATENCY: Duration = Duration::from_secs(2);

/// Register `send_email`, `resize_image` and `generate_pdf`.
pub fn register_builtin(builder: HandlerRegistryBuilder) -> HandlerRegistryBuilder {
    builder
        .register("send_email", SendEmail::default())
        .register("resize_image", ResizeImage)
        .register("generate_pdf", GeneratePdf)
}

fn field<'a>(payload: &'a Payload, key: &str) -> &'a Value {
    payload.get(key).unwrap_or(&Value::Null)
}

/// Pretends to send an email to `payload.to` with `payload.subject`.
#[derive(Debug, Clone)]
pub struct SendEmail {
    latency: Duration,
}

impl SendEmail {
    /// Handler that sleeps `latency` per message.
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for SendEmail {
    fn default() -> Self {
        Self::with_latency(DEFAULT_EMAIL_LATENCY)
    }
}

#[async_trait]
impl TaskHandler for SendEmail {
    async fn execute(&self, payload: &Payload) -> Result<(), ProcessingError> {
        tokio::time::sleep(self.latency).await;
        info!(
            to = %field(payload, "to"),
            subject = %field(payload, "subject"),
            "Sending email"
        );
        Ok(())
    }
}

/// Pretends to resize an image to `payload.new_x` by `payload.new_y`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResizeImage;

#[async_trait]
impl TaskHandler for ResizeImage {
    async fn execute(&self, payload: &Payload) -> Result<(), ProcessingError> {
        info!(
            new_x = %field(payload, "new_x"),
            new_y = %field(payload, "new_y"),
            "Resizing image"
        );
        Ok(())
    }
}

/// Pretends to render a PDF.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneratePdf;

#[async_trait]
impl TaskHandler for GeneratePdf {
    async fn execute(&self, _payload: &Payload) -> Result<(), ProcessingError> {
        info!("Generating pdf");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::HandlerRegistry;
    use crate::task::Task;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_builtin_types_registered() {
        let registry = register_builtin(HandlerRegistry::builder()).build();
        assert_eq!(
            registry.registered_types(),
            vec!["generate_pdf", "resize_image", "send_email"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_email_waits_for_latency() {
        let handler = SendEmail::default();
        let started = tokio::time::Instant::now();

        assert_ok!(
            handler
                .execute(&payload(json!({"to": "a@b.c", "subject": "hi"})))
                .await
        );
        assert!(started.elapsed() >= DEFAULT_EMAIL_LATENCY);
    }

    #[tokio::test]
    async fn test_builtins_through_registry() {
        let registry = HandlerRegistry::builder()
            .register("send_email", SendEmail::with_latency(Duration::ZERO))
            .register("resize_image", ResizeImage)
            .register("generate_pdf", GeneratePdf)
            .build();

        for (task_type, body) in [
            ("send_email", json!({"to": "a@b.c"})),
            ("resize_image", json!({"new_x": 640, "new_y": 480})),
            ("generate_pdf", json!({"doc": 1})),
        ] {
            let task = Task::new(task_type, payload(body), 0);
            assert_ok!(registry.dispatch(&task).await);
        }

        assert_err!(
            registry
                .dispatch(&Task::new("generate_pdf", Payload::new(), 0))
                .await
        );
    }
}
