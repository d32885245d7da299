use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
};
use tracing::{debug, info, instrument};

use crate::{link::ResetRequest, ResponseMode};

use super::{AppState, Error, Result};

pub(super) const CORS_HEADERS: [(&str, &str); 4] = [
    ("access-control-allow-origin", "*"),
    (
        "access-control-allow-headers",
        "authorization, x-client-info, apikey, content-type",
    ),
    ("access-control-allow-methods", "GET, OPTIONS"),
    ("access-control-max-age", "86400"),
];

pub(super) async fn preflight() -> impl IntoResponse {
    (StatusCode::NO_CONTENT, CORS_HEADERS)
}

#[instrument(skip_all, fields(path = %uri.path()))]
pub(super) async fn handle(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response> {
    debug!(%method, "incoming request");

    if method == Method::OPTIONS {
        return Ok(preflight().await.into_response());
    }

    if method != Method::GET && method != Method::HEAD {
        return Err(Error::MethodNotAllowed);
    }

    let mode = match state.config.response_mode {
        ResponseMode::Auto if accepts_html(&headers) => ResponseMode::Html,
        ResponseMode::Auto => ResponseMode::Redirect,
        mode => mode,
    };

    if mode == ResponseMode::Html {
        debug!("serving redirect page");

        return Ok((
            CORS_HEADERS,
            [(header::CACHE_CONTROL, "no-store")],
            Html(state.page.bytes()),
        )
            .into_response());
    }

    let req = uri
        .query()
        .filter(|_| state.config.token_source.query())
        .and_then(ResetRequest::from_query)
        .ok_or_else(|| {
            info!("no reset token in query string");
            Error::MissingToken
        })?;

    let target = state.config.link.target(&req);

    info!(kind = req.kind(), "redirecting to app");

    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, HeaderValue::from_str(target.as_str())?)],
    )
        .into_response())
}

/// Browsers navigating to a page list `text/html`; API clients and `curl` do not.
fn accepts_html(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|media| {
            media
                .split(';')
                .next()
                .map_or(false, |media| media.trim().eq_ignore_ascii_case("text/html"))
        })
}
