use axum::body::Body;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::header::{
    CACHE_CONTROL, CONTENT_TYPE, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use maud::Markup;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error};

use crate::api::pages;
use crate::gallery::{authorize_photo, project, Gallery, ProjectError};
use crate::storage::models::{CapabilityToken, Photo, SubjectType};
use crate::tokens::auditor::{record_access_or_warn, AccessContext};
use crate::tokens::{validate, Validation};
use crate::AppState;

const HEADER_X_ROBOTS_TAG: HeaderName = HeaderName::from_static("x-robots-tag");
const HEADER_X_REAL_IP: &str = "x-real-ip";
const HEADER_X_FORWARDED_FOR: &str = "x-forwarded-for";

/// `?t=<secret>`
#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub t: Option<String>,
}

/// The secret URL is the only access control, so nothing public may be indexed,
/// framed, cached, or leak through a referrer.
fn apply_public_headers(headers: &mut HeaderMap) {
    headers.insert(
        HEADER_X_ROBOTS_TAG,
        HeaderValue::from_static("noindex, nofollow"),
    );
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
}

fn html_response(status: StatusCode, markup: Markup) -> Response {
    let mut response = (status, Html(markup.into_string())).into_response();
    apply_public_headers(response.headers_mut());
    response
}

fn denied() -> Response {
    html_response(StatusCode::NOT_FOUND, pages::link_unavailable())
}

fn unavailable() -> Response {
    html_response(StatusCode::SERVICE_UNAVAILABLE, pages::service_unavailable())
}

/// First parseable address from X-Forwarded-For, X-Real-IP, then the socket peer
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get(HEADER_X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next());
    let real_ip = headers.get(HEADER_X_REAL_IP).and_then(|v| v.to_str().ok());

    forwarded
        .into_iter()
        .chain(real_ip)
        .map(str::trim)
        .find(|candidate| candidate.parse::<IpAddr>().is_ok())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

fn access_context(headers: &HeaderMap, peer: Option<SocketAddr>) -> AccessContext {
    AccessContext {
        ip: client_ip(headers, peer),
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

/// Resolve `?t=` to a granted token for the expected subject type.
///
/// `Err` carries the finished public response (denial or 503).
fn grant(
    state: &AppState,
    query: Option<Query<TokenQuery>>,
    expected: Option<SubjectType>,
) -> Result<CapabilityToken, Response> {
    let secret = query.and_then(|Query(q)| q.t).unwrap_or_default();

    let token = match validate(&state.db, &secret) {
        Ok(Validation::Granted(token)) => token,
        Ok(Validation::Denied(reason)) => {
            debug!(reason = reason.as_str(), "Public link denied");
            return Err(denied());
        }
        Err(e) => {
            error!(error = %e, "Failed to validate public link");
            return Err(unavailable());
        }
    };

    if let Some(expected) = expected {
        if token.subject_type != expected {
            debug!(
                token_id = token.id,
                token_subject = %token.subject_type,
                endpoint_subject = %expected,
                "Public link presented at the wrong viewer"
            );
            return Err(denied());
        }
    }

    Ok(token)
}

async fn serve_gallery(
    state: &AppState,
    expected: SubjectType,
    query: Option<Query<TokenQuery>>,
    ctx: AccessContext,
) -> Response {
    let token = match grant(state, query, Some(expected)) {
        Ok(token) => token,
        Err(response) => return response,
    };

    record_access_or_warn(&state.db, &token, ctx);

    let gallery = match project(&state.db, &token) {
        Ok(gallery) => gallery,
        Err(ProjectError::SubjectMissing {
            subject_id,
            subject_type,
        }) => {
            debug!(token_id = token.id, %subject_type, subject_id, "Shared subject was deleted");
            return denied();
        }
        Err(ProjectError::Catalog(e)) => {
            error!(error = %e, token_id = token.id, "Failed to load shared gallery");
            return unavailable();
        }
    };

    let markup = match &gallery {
        Gallery::Room(room) => pages::room_gallery(room, &token.secret),
        Gallery::Task(task) => pages::task_gallery(task, &token.secret),
    };
    html_response(StatusCode::OK, markup)
}

pub async fn task_photos(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    query: Option<Query<TokenQuery>>,
) -> Response {
    let ctx = access_context(&headers, peer.map(|ConnectInfo(addr)| addr));
    serve_gallery(&state, SubjectType::Task, query, ctx).await
}

pub async fn room_photos(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    query: Option<Query<TokenQuery>>,
) -> Response {
    let ctx = access_context(&headers, peer.map(|ConnectInfo(addr)| addr));
    serve_gallery(&state, SubjectType::Room, query, ctx).await
}

/// Stored file names are plain names inside the photos directory
fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

fn content_type_for(photo: &Photo) -> String {
    photo.content_type.clone().unwrap_or_else(|| {
        mime_guess::from_path(&photo.file_name)
            .first_or_octet_stream()
            .to_string()
    })
}

/// Photo bytes for a photo inside the granted gallery. Not audited.
pub async fn photo_file(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    query: Option<Query<TokenQuery>>,
) -> Response {
    let Ok(photo_id) = raw_id.parse::<u64>() else {
        return denied();
    };

    let token = match grant(&state, query, None) {
        Ok(token) => token,
        Err(response) => return response,
    };

    let photo = match authorize_photo(&state.db, &token, photo_id) {
        Ok(Some(photo)) => photo,
        Ok(None) => {
            debug!(token_id = token.id, photo_id, "Photo outside the shared gallery");
            return denied();
        }
        Err(e) => {
            error!(error = %e, photo_id, "Failed to resolve shared photo");
            return unavailable();
        }
    };

    if !is_safe_file_name(&photo.file_name) {
        error!(photo_id, file_name = %photo.file_name, "Refusing unsafe photo file name");
        return denied();
    }

    let path = state.config.photos_dir().join(&photo.file_name);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(photo_id, path = %path.display(), "Photo file missing on disk");
            return denied();
        }
        Err(e) => {
            error!(error = %e, photo_id, "Failed to read photo file");
            return unavailable();
        }
    };

    let mut response = Response::new(Body::from(bytes));
    if let Ok(value) = HeaderValue::from_str(&content_type_for(&photo)) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    apply_public_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::make_photo;

    #[test]
    fn test_client_ip_precedence() {
        let peer: SocketAddr = "10.0.0.9:5555".parse().unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("10.0.0.9"));

        headers.insert(HEADER_X_REAL_IP, HeaderValue::from_static("192.0.2.7"));
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("192.0.2.7"));

        headers.insert(
            HEADER_X_FORWARDED_FOR,
            HeaderValue::from_static("203.0.113.5, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("203.0.113.5"));
    }

    #[test]
    fn test_client_ip_skips_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_X_FORWARDED_FOR, HeaderValue::from_static("unknown"));
        assert_eq!(client_ip(&headers, None), None);

        headers.insert(HEADER_X_REAL_IP, HeaderValue::from_static("2001:db8::1"));
        assert_eq!(client_ip(&headers, None).as_deref(), Some("2001:db8::1"));
    }

    #[test]
    fn test_file_name_guard() {
        assert!(is_safe_file_name("photo-1.jpg"));
        assert!(!is_safe_file_name("../secrets.redb"));
        assert!(!is_safe_file_name("a/b.jpg"));
        assert!(!is_safe_file_name(".."));
        assert!(!is_safe_file_name(""));
    }

    #[test]
    fn test_content_type_falls_back_to_extension() {
        let mut photo = make_photo(1, 1);
        photo.content_type = None;
        photo.file_name = "shot.png".to_string();
        assert_eq!(content_type_for(&photo), "image/png");

        photo.file_name = "blob".to_string();
        assert_eq!(content_type_for(&photo), "application/octet-stream");
    }
}
