use std::{any::Any, sync::Arc};

use anyhow::Context;
use axum::{
    body::{Bytes, Full},
    http::{Response, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::{page::Page, Config, RedirectConfig};

mod error;
mod redirect;

pub use error::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Clone)]
struct AppState {
    config: Arc<RedirectConfig>,
    page: Arc<Page>,
}

pub async fn serve(config: Config) -> anyhow::Result<()> {
    let app = app(config.redirect_config()?)?;

    info!(addr = %config.listen, "listening");

    axum::Server::bind(&config.listen)
        .serve(app.into_make_service())
        .await
        .context("serve failed")
}

pub fn app(config: RedirectConfig) -> anyhow::Result<Router> {
    config.validate()?;

    let page = Page::render(&config).context("failed to render redirect page")?;

    let state = AppState {
        config: Arc::new(config),
        page: Arc::new(page),
    };

    Ok(Router::new()
        .route("/health", get(health).options(redirect::preflight))
        .fallback(redirect::handle)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response)))
}

fn panic_response(_: Box<dyn Any + Send + 'static>) -> Response<Full<Bytes>> {
    error!("handler panicked");

    let mut res = Response::new(Full::from(Error::internal().to_string()));
    *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    res
}

#[derive(Debug, Serialize)]
struct Health {
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    let health = Health {
        version: env!("CARGO_PKG_VERSION"),
    };

    ([("cache-control", "no-cache")], Json(health))
}
