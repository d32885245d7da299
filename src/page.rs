//! The HTML page served to browsers.
//!
//! Hash fragments never reach the server, so the page carries a small script
//! that reads `location.hash` and `location.search` itself and navigates to
//! the deep link. [`ResetRequest::resolve`](crate::link::ResetRequest::resolve)
//! models that lookup in Rust; the script tests hold the two to the same
//! answers.

use axum::body::Bytes;
use handlebars::Handlebars;
use serde::Serialize;

use crate::RedirectConfig;

const TEMPLATE: &str = "redirect";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid template: {0}")]
    Template(#[from] Box<handlebars::TemplateError>),
    #[error("failed to render page: {0}")]
    Render(#[from] handlebars::RenderError),
    #[error("failed to serialize script config: {0}")]
    Json(#[from] serde_json::Error),
}

/// What the script needs to know, embedded as a JSON literal.
#[derive(Debug, Serialize)]
struct ScriptConfig<'a> {
    base: &'a str,
    home: &'a str,
    app_name: &'a str,
    hash: bool,
    query: bool,
    fallback_delay_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
struct PageData<'a> {
    app_name: &'a str,
    config: String,
    fallback_hidden: bool,
}

/// A rendered redirect page. It does not depend on the request, so it is
/// rendered once and served as is.
#[derive(Debug, Clone)]
pub struct Page {
    html: Bytes,
}

impl Page {
    pub fn render(config: &RedirectConfig) -> Result<Self, Error> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry
            .register_template_string(TEMPLATE, include_str!("templates/redirect.hbs"))
            .map_err(Box::new)?;

        let script = ScriptConfig {
            base: config.link.base().as_str(),
            home: config.link.home().as_str(),
            app_name: &config.app_name,
            hash: config.token_source.hash(),
            query: config.token_source.query(),
            fallback_delay_ms: config
                .fallback_delay
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        };

        let data = PageData {
            app_name: &config.app_name,
            config: script_json(&script)?,
            fallback_hidden: config.fallback_delay.is_some(),
        };

        Ok(Self {
            html: registry.render(TEMPLATE, &data)?.into(),
        })
    }

    /// The page body; cloning only bumps a reference count.
    pub fn bytes(&self) -> Bytes {
        self.html.clone()
    }
}

/// JSON that is safe to place inside a `<script>` element: `</script>` and
/// `<!--` cannot appear once `<` is escaped.
fn script_json(value: &impl Serialize) -> Result<String, serde_json::Error> {
    Ok(serde_json::to_string(value)?.replace('<', "\\u003c"))
}
