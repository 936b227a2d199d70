//! Optional bearer-token gate for the proxy routes.
//!
//! The relay has no user model of its own. Deployments that sit behind a
//! session-aware gateway leave `ACCESS_TOKEN` unset; standalone deployments
//! set it so only clients presenting `Authorization: Bearer <token>` can use
//! the relay.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use tracing::warn;

use super::state::AppState;
use crate::error::RelayError;

/// Decode the `Authorization: Bearer` credentials, scheme matched in any case.
fn bearer_token(headers: &HeaderMap) -> Option<Authorization<Bearer>> {
    headers.typed_get::<Authorization<Bearer>>()
}

/// Compare tokens without short-circuiting on the first differing byte.
fn token_matches(presented: &str, expected: &str) -> bool {
    let (presented, expected) = (presented.as_bytes(), expected.as_bytes());
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .iter()
        .zip(expected)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

/// Axum middleware: reject proxy requests without the configured token.
pub async fn access_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(expected) = state.config.access_token.as_deref() {
        let authorized = bearer_token(req.headers())
            .is_some_and(|auth| token_matches(auth.token(), expected));

        if !authorized {
            warn!("Rejected unauthenticated request to {}", req.uri().path());
            return RelayError::Unauthorized.into_response();
        }
    }

    next.run(req).await
}
