use std::{net::SocketAddr, time::Duration};

use anyhow::{bail, Context};

pub mod http;
pub mod link;
pub mod page;

use link::{DeepLink, TokenSource};

/// How long the page waits before offering a manual link when set up with a
/// fallback timer.
pub const FALLBACK_DELAY: Duration = Duration::from_millis(3000);

const SCHEME: &str = "parkmywhip";
const HOST: &str = "parkmywhip.com";
const ROUTE: &str = "reset-password";
const LEGACY_ROUTE: &str = "resetPassword";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ResponseMode {
    /// `302` straight to the app, `400` without a token.
    Redirect,
    /// A page whose script finds the token in the browser.
    Html,
    /// `Html` for browsers, `Redirect` for everyone else.
    Auto,
}

/// Known reset link flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Preset {
    /// Links from our own email template, `?token=..`.
    EmailTemplate,
    /// Redirects from the auth provider, `#access_token=..`.
    AuthCallback,
    /// Like `AuthCallback`, revealing a manual link after a delay.
    AuthCallbackTimer,
}

#[derive(clap::Parser)]
pub struct Config {
    #[clap(long, env, default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// Defaults for the options below. Explicit options take precedence.
    #[clap(long, env, value_enum)]
    pub preset: Option<Preset>,

    /// Custom URI scheme registered by the app.
    #[clap(long, env, default_value = SCHEME)]
    pub scheme: String,

    #[clap(long, env, default_value = HOST)]
    pub deep_link_host: String,

    /// In-app route receiving the token.
    #[clap(long, env)]
    pub route_segment: Option<String>,

    #[clap(long, env, value_enum)]
    pub token_source: Option<TokenSource>,

    #[clap(long, env, value_enum)]
    pub response_mode: Option<ResponseMode>,

    /// Reveal a manual link this many milliseconds after the page loads.
    #[clap(long, env)]
    pub fallback_delay_ms: Option<u64>,

    #[clap(long, env, default_value = "ParkMyWhip")]
    pub app_name: String,
}

impl Config {
    pub fn redirect_config(&self) -> anyhow::Result<RedirectConfig> {
        let preset = match self.preset {
            Some(Preset::EmailTemplate) => RedirectConfig::email_template(),
            Some(Preset::AuthCallback) => RedirectConfig::auth_callback(),
            Some(Preset::AuthCallbackTimer) => RedirectConfig::auth_callback_with_timer(),
            None => RedirectConfig {
                response_mode: ResponseMode::Auto,
                ..RedirectConfig::auth_callback()
            },
        };

        let route = self
            .route_segment
            .as_deref()
            .unwrap_or_else(|| preset.link.base().path().trim_start_matches('/'));

        let config = RedirectConfig {
            link: DeepLink::new(&self.scheme, &self.deep_link_host, route)
                .context("invalid deep link")?,
            token_source: self.token_source.unwrap_or(preset.token_source),
            response_mode: self.response_mode.unwrap_or(preset.response_mode),
            fallback_delay: self
                .fallback_delay_ms
                .map(Duration::from_millis)
                .or(preset.fallback_delay),
            app_name: self.app_name.clone(),
        };

        config.validate()?;

        Ok(config)
    }
}

/// Everything the redirect handler varies on.
#[derive(Debug, Clone)]
pub struct RedirectConfig {
    pub link: DeepLink,
    pub token_source: TokenSource,
    pub response_mode: ResponseMode,
    pub fallback_delay: Option<Duration>,
    pub app_name: String,
}

impl RedirectConfig {
    fn preset(route: &str, token_source: TokenSource, response_mode: ResponseMode) -> Self {
        Self {
            link: DeepLink::new(SCHEME, HOST, route).expect("failed to parse default deep link"),
            token_source,
            response_mode,
            fallback_delay: None,
            app_name: "ParkMyWhip".to_owned(),
        }
    }

    pub fn email_template() -> Self {
        Self::preset(LEGACY_ROUTE, TokenSource::Query, ResponseMode::Redirect)
    }

    pub fn auth_callback() -> Self {
        Self::preset(ROUTE, TokenSource::Both, ResponseMode::Html)
    }

    pub fn auth_callback_with_timer() -> Self {
        Self {
            fallback_delay: Some(FALLBACK_DELAY),
            ..Self::auth_callback()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.response_mode == ResponseMode::Redirect && self.token_source == TokenSource::Hash {
            bail!("hash fragments never reach the server; use html or auto responses");
        }

        Ok(())
    }
}
