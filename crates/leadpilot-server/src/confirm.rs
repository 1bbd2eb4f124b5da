//! Email confirmation redirect handler.
//!
//! `GET /auth/confirm?token_hash=..&type=..` verifies a one-time code and
//! redirects (303) to the success path, or to the error path with an
//! `error` query parameter. Missing parameters or an unknown type are
//! rejected with 400 before any verification is attempted.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use leadpilot_auth::SessionStore;
use leadpilot_core::error::{ErrorCategory, LeadpilotError, LeadpilotResult};
use leadpilot_core::models::principal::Principal;
use leadpilot_core::models::session::VerificationKind;
use leadpilot_core::repository::{
    ApprovalGateway, PrincipalRepository, SessionRepository, VerificationRepository,
};
use serde::Deserialize;
use tracing::{info, warn};

/// What the confirmation route needs from the session store.
pub trait OtpVerifier: Send + Sync + 'static {
    fn verify_otp(
        &self,
        token_hash: &str,
        kind: VerificationKind,
    ) -> impl Future<Output = LeadpilotResult<Principal>> + Send;
}

impl<P, S, V, A> OtpVerifier for SessionStore<P, S, V, A>
where
    P: PrincipalRepository + 'static,
    S: SessionRepository + 'static,
    V: VerificationRepository + 'static,
    A: ApprovalGateway + 'static,
{
    fn verify_otp(
        &self,
        token_hash: &str,
        kind: VerificationKind,
    ) -> impl Future<Output = LeadpilotResult<Principal>> + Send {
        SessionStore::verify_otp(self, token_hash, kind)
    }
}

pub struct ConfirmState<V> {
    pub verifier: V,
    pub success_path: String,
    pub error_path: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    pub token_hash: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

pub fn router<V: OtpVerifier>(state: Arc<ConfirmState<V>>) -> Router {
    Router::new()
        .route("/auth/confirm", get(confirm_email::<V>))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn confirm_email<V: OtpVerifier>(
    State(state): State<Arc<ConfirmState<V>>>,
    Query(query): Query<ConfirmQuery>,
) -> Response {
    let (token_hash, kind) = match parse_query(&query) {
        Ok(parsed) => parsed,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };

    match state.verifier.verify_otp(token_hash, kind).await {
        Ok(principal) => {
            info!(principal_id = %principal.id, kind = kind.as_str(), "Email confirmation succeeded");
            Redirect::to(&state.success_path).into_response()
        }
        Err(e) => {
            warn!(error = %e, kind = kind.as_str(), "Email confirmation failed");
            let target = append_query_params(&state.error_path, &[("error", &public_message(&e))]);
            Redirect::to(&target).into_response()
        }
    }
}

fn parse_query(query: &ConfirmQuery) -> Result<(&str, VerificationKind), &'static str> {
    let token_hash = query
        .token_hash
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or("missing token_hash")?;
    let kind = query
        .kind
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or("missing type")?;
    let kind = VerificationKind::parse(kind).ok_or("unknown type")?;
    Ok((token_hash, kind))
}

/// Backend details stay in the log.
fn public_message(err: &LeadpilotError) -> String {
    match err.category() {
        ErrorCategory::Authentication | ErrorCategory::Validation => err.to_string(),
        _ => "verification could not be completed".to_string(),
    }
}

fn append_query_params(base_url: &str, params: &[(&str, &str)]) -> String {
    let query_string = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    if base_url.contains('?') {
        format!("{base_url}&{query_string}")
    } else {
        format!("{base_url}?{query_string}")
    }
}
