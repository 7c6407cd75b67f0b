use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::server::AppState;

pub const API_VERSION_HEADER: &str = "Audiohost-Api-Version";
pub const API_VERSION: &str = "1";

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthFailure {
    Missing,
    Invalid,
}

fn authorize(headers: &HeaderMap, password: &str) -> Result<(), AuthFailure> {
    match headers.get("authorization").map(|h| h.to_str()) {
        None => Err(AuthFailure::Missing),
        Some(Ok(auth)) if auth == password => Ok(()),
        Some(_) => Err(AuthFailure::Invalid),
    }
}

/// Rejects every request, WebSocket upgrades included, whose `Authorization`
/// header does not match `server.password`.
pub async fn check_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    match authorize(req.headers(), &state.config.server.password) {
        Ok(()) => Ok(next.run(req).await),
        Err(failure) => {
            warn!("Authorization failed on {}: {:?}", req.uri().path(), failure);
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

pub async fn add_response_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(auth: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(auth) = auth {
            headers.insert("authorization", HeaderValue::from_str(auth).unwrap());
        }
        headers
    }

    #[test]
    fn password_must_match_exactly() {
        assert_eq!(authorize(&headers(Some("secret")), "secret"), Ok(()));
        assert_eq!(
            authorize(&headers(Some("Secret")), "secret"),
            Err(AuthFailure::Invalid)
        );
        assert_eq!(authorize(&headers(None), "secret"), Err(AuthFailure::Missing));
    }
}
