use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::domain::{CandidateField, CandidateRecord};
use super::driver::SessionDriver;
use super::machine::WorkflowError;
use super::session::{OnboardingSession, SessionSnapshot};
use crate::error::AppError;

/// Body for editing a single form field.
#[derive(Debug, Deserialize)]
pub struct CandidateUpdate {
    pub field: CandidateField,
    pub value: String,
}

/// Submit either the supplied record or, when absent, the draft built through edits.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub candidate: Option<CandidateRecord>,
}

impl SubmitRequest {
    /// An empty body submits the draft.
    pub fn from_body(body: &[u8]) -> Result<Self, serde_json::Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

type SnapshotResponse = Result<(StatusCode, Json<SessionSnapshot>), AppError>;

/// Router exposing the session intents and state over HTTP.
pub fn session_router(driver: Arc<SessionDriver>) -> Router {
    Router::new()
        .route("/api/v1/session", get(snapshot_handler))
        .route("/api/v1/session/candidate", patch(update_candidate_handler))
        .route("/api/v1/session/validate", post(validate_handler))
        .route("/api/v1/session/submit", post(submit_handler))
        .route(
            "/api/v1/session/contract/authorization",
            post(request_authorization_handler).delete(cancel_authorization_handler),
        )
        .route(
            "/api/v1/session/contract/confirm",
            post(confirm_contract_handler),
        )
        .route(
            "/api/v1/session/payment/confirm",
            post(confirm_payment_handler),
        )
        .route(
            "/api/v1/session/chat",
            get(chat_log_handler).post(send_message_handler),
        )
        .route("/api/v1/session/reset", post(reset_handler))
        .with_state(driver)
}

pub(crate) async fn snapshot_handler(
    State(driver): State<Arc<SessionDriver>>,
) -> Json<SessionSnapshot> {
    Json(driver.snapshot().await)
}

pub(crate) async fn update_candidate_handler(
    State(driver): State<Arc<SessionDriver>>,
    Json(update): Json<CandidateUpdate>,
) -> SnapshotResponse {
    let snapshot = apply(&driver, move |session| {
        session.update_candidate(update.field, &update.value)
    })
    .await?;
    Ok((StatusCode::OK, Json(snapshot)))
}

pub(crate) async fn validate_handler(State(driver): State<Arc<SessionDriver>>) -> Json<Value> {
    let errors = driver
        .with_session(|session, _| session.validate_draft().clone())
        .await;
    let valid = errors.is_empty();
    Json(json!({ "valid": valid, "validation_errors": errors }))
}

pub(crate) async fn submit_handler(
    State(driver): State<Arc<SessionDriver>>,
    body: Bytes,
) -> SnapshotResponse {
    let request = SubmitRequest::from_body(&body)?;
    let snapshot = driver
        .with_session(move |session, now| {
            let result = match request.candidate {
                Some(record) => session.submit(record, now),
                None => session.submit_draft(now),
            };
            result.map(|()| session.snapshot())
        })
        .await?;
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

pub(crate) async fn request_authorization_handler(
    State(driver): State<Arc<SessionDriver>>,
) -> SnapshotResponse {
    let snapshot = apply(&driver, |session| session.request_contract_authorization()).await?;
    Ok((StatusCode::OK, Json(snapshot)))
}

pub(crate) async fn cancel_authorization_handler(
    State(driver): State<Arc<SessionDriver>>,
) -> SnapshotResponse {
    let snapshot = apply(&driver, |session| session.cancel_contract_authorization()).await?;
    Ok((StatusCode::OK, Json(snapshot)))
}

pub(crate) async fn confirm_contract_handler(
    State(driver): State<Arc<SessionDriver>>,
) -> SnapshotResponse {
    let snapshot = driver
        .with_session(|session, now| session.confirm_contract(now).map(|()| session.snapshot()))
        .await?;
    Ok((StatusCode::OK, Json(snapshot)))
}

pub(crate) async fn confirm_payment_handler(
    State(driver): State<Arc<SessionDriver>>,
) -> SnapshotResponse {
    let snapshot = driver
        .with_session(|session, now| -> Result<SessionSnapshot, WorkflowError> {
            session.confirm_payment(now)?;
            Ok(session.snapshot())
        })
        .await?;
    Ok((StatusCode::OK, Json(snapshot)))
}

pub(crate) async fn chat_log_handler(State(driver): State<Arc<SessionDriver>>) -> Json<Value> {
    let messages = driver
        .with_session(|session, _| session.messages().to_vec())
        .await;
    Json(json!({ "messages": messages }))
}

pub(crate) async fn send_message_handler(
    State(driver): State<Arc<SessionDriver>>,
    Json(request): Json<ChatRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let messages = driver
        .with_session(move |session, now| {
            session
                .send_user_message(&request.message, now)
                .map(|_| session.messages().to_vec())
        })
        .await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "messages": messages }))))
}

pub(crate) async fn reset_handler(
    State(driver): State<Arc<SessionDriver>>,
) -> Json<SessionSnapshot> {
    let snapshot = driver
        .with_session(|session, now| {
            session.reset(now);
            session.snapshot()
        })
        .await;
    Json(snapshot)
}

async fn apply<F>(driver: &SessionDriver, intent: F) -> Result<SessionSnapshot, WorkflowError>
where
    F: FnOnce(&mut OnboardingSession) -> Result<(), WorkflowError>,
{
    driver
        .with_session(|session, _| intent(session).map(|()| session.snapshot()))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::onboarding::chat::CyclingReplySelector;
    use crate::workflows::onboarding::driver::{Clock, MonotonicClock};
    use crate::workflows::onboarding::session::SessionSettings;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use axum::response::Response;
    use tower::ServiceExt;

    fn router() -> Router {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let session = OnboardingSession::with_selector(
            SessionSettings::default(),
            Box::new(CyclingReplySelector::default()),
            clock.now(),
        );
        session_router(Arc::new(SessionDriver::spawn(session, clock)))
    }

    fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    fn empty_request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn snapshot_starts_in_application() {
        let response = router()
            .oneshot(empty_request(Method::GET, "/api/v1/session"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["stage"], "application");
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
        assert!(body["process_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn empty_submission_returns_field_errors() {
        let response = router()
            .oneshot(json_request(Method::POST, "/api/v1/session/submit", json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        let errors = body["validation_errors"].as_object().expect("error map");
        assert!(errors.contains_key("name"));
        assert!(errors.contains_key("motivation_text"));
        assert!(!errors.contains_key("prior_experience"));
    }

    #[tokio::test]
    async fn payment_before_equipment_conflicts() {
        let response = router()
            .oneshot(empty_request(Method::POST, "/api/v1/session/payment/confirm"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["stage"], "application");
    }

    #[tokio::test]
    async fn candidate_patch_formats_national_id() {
        let response = router()
            .oneshot(json_request(
                Method::PATCH,
                "/api/v1/session/candidate",
                json!({ "field": "national_id", "value": "12345678909" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["candidate"]["national_id"], "123.456.789-09");
    }

    #[tokio::test]
    async fn blank_chat_message_is_unprocessable() {
        let response = router()
            .oneshot(json_request(
                Method::POST,
                "/api/v1/session/chat",
                json!({ "message": "   " }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn bodyless_submit_validates_the_draft() {
        let response = router()
            .oneshot(empty_request(Method::POST, "/api/v1/session/submit"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        let errors = body["validation_errors"].as_object().expect("error map");
        assert!(errors.contains_key("email"));
    }

    #[tokio::test]
    async fn bodyless_submit_sends_a_completed_draft() {
        let app = router();
        let draft = [
            ("name", "Rafael Souza".to_string()),
            ("national_id", "12345678909".to_string()),
            ("email", "rafael@example.com".to_string()),
            ("phone", "+55 21 99999-0000".to_string()),
            ("address", "Rua do Catete 12, Rio de Janeiro".to_string()),
            ("motivation_text", vec!["motivated"; 30].join(" ")),
        ];
        for (field, value) in draft {
            let response = app
                .clone()
                .oneshot(json_request(
                    Method::PATCH,
                    "/api/v1/session/candidate",
                    json!({ "field": field, "value": value }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(empty_request(Method::POST, "/api/v1/session/submit"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["stage"], "analyzing");
    }

    #[tokio::test]
    async fn malformed_submit_body_is_a_bad_request() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/session/submit")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"candidate\":"))
            .unwrap();
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
