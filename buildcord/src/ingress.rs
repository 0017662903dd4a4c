//! Webhook endpoint receiving CI build notifications.
//!
//! `POST /notifications` takes the form-encoded Travis CI payload, checks it with a
//! [`PayloadVerifier`] and enqueues it. `GET /notifications` enqueues a fake
//! notification so the relay can be tested by hand.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use buildcord_common::{BuildNotification, TravisPayload};

use crate::queue::NotificationQueue;

/// Checks a webhook payload against the signature sent along with it.
///
/// Key retrieval and signature algorithms live with the implementor, see
/// [`TravisVerifier`](crate::travis::TravisVerifier).
#[async_trait]
pub trait PayloadVerifier: Send + Sync {
    async fn verify(&self, payload: &str, signature: &str) -> bool;
}

/// Verifier accepting every payload, for deployments behind a trusted proxy.
pub struct AcceptAll;

#[async_trait]
impl PayloadVerifier for AcceptAll {
    async fn verify(&self, _payload: &str, _signature: &str) -> bool {
        true
    }
}

/// Shared state for the ingress handlers.
pub struct IngressState {
    pub queue: Arc<NotificationQueue>,
    pub verifier: Arc<dyn PayloadVerifier>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationForm {
    #[serde(default)]
    payload: Option<String>,
}

/// Build the ingress router.
pub fn router(state: Arc<IngressState>) -> Router {
    Router::new()
        .route("/notifications", get(fake).post(notifications))
        .with_state(state)
}

/// POST /notifications - Enqueue a signed Travis CI notification.
pub async fn notifications(
    State(state): State<Arc<IngressState>>,
    headers: HeaderMap,
    form: Result<Form<NotificationForm>, FormRejection>,
) -> Json<Value> {
    let payload = match form {
        Ok(Form(NotificationForm {
            payload: Some(payload),
        })) => payload,
        Ok(_) => {
            tracing::warn!("Notification without payload");
            return Json(json!({ "ok": false }));
        }
        Err(e) => {
            tracing::warn!("Unreadable notification form: {}", e);
            return Json(json!({ "ok": false }));
        }
    };

    let signature = headers
        .get("Signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !state.verifier.verify(&payload, signature).await {
        tracing::warn!("Notification signature failure");
        return Json(json!({ "ok": false }));
    }

    match serde_json::from_str::<TravisPayload>(&payload) {
        Ok(travis) => {
            let notification = BuildNotification::from(travis);
            tracing::info!(
                repository = %notification.repository_name,
                status = %notification.status_message,
                "Notification enqueued"
            );
            state.queue.push(notification);
            Json(json!({ "ok": true }))
        }
        Err(e) => {
            tracing::warn!("Notification payload is not JSON: {}", e);
            Json(json!({ "ok": false }))
        }
    }
}

/// GET /notifications - Enqueue a fake notification.
pub async fn fake(State(state): State<Arc<IngressState>>) -> Json<Value> {
    state.queue.push(BuildNotification::fake());
    Json(json!({ "ok": true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RejectAll;

    #[async_trait]
    impl PayloadVerifier for RejectAll {
        async fn verify(&self, _payload: &str, _signature: &str) -> bool {
            false
        }
    }

    fn state(verifier: Arc<dyn PayloadVerifier>) -> Arc<IngressState> {
        Arc::new(IngressState {
            queue: Arc::new(NotificationQueue::new()),
            verifier,
        })
    }

    #[tokio::test]
    async fn test_fake_enqueues() {
        let state = state(Arc::new(AcceptAll));
        let Json(body) = fake(State(state.clone())).await;
        assert_eq!(body["ok"], true);

        let queued = state.queue.pop().await.unwrap();
        assert_eq!(queued.status_message, "test");
        assert_eq!(queued.repository_name, "travisbot");
    }

    #[tokio::test]
    async fn test_rejected_signature_is_not_enqueued() {
        let state = state(Arc::new(RejectAll));
        let form = Form(NotificationForm {
            payload: Some(r#"{"status_message":"Passed"}"#.to_string()),
        });

        let Json(body) = notifications(State(state.clone()), HeaderMap::new(), Ok(form)).await;
        assert_eq!(body["ok"], false);
        assert!(state.queue.is_empty());
    }

    #[tokio::test]
    async fn test_missing_payload() {
        let state = state(Arc::new(AcceptAll));
        let form = Form(NotificationForm { payload: None });

        let Json(body) = notifications(State(state.clone()), HeaderMap::new(), Ok(form)).await;
        assert_eq!(body["ok"], false);
        assert!(state.queue.is_empty());
    }
}
