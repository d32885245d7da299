//! Deep links into the mobile app and the reset tokens they carry.

use std::fmt::Write;

use url::{form_urlencoded, Url};

/// Used when a reset link does not say what kind of token it carries.
pub const DEFAULT_TYPE: &str = "recovery";

/// Where a reset token may be found on the incoming URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TokenSource {
    /// `?token=..&type=..`, visible to the server.
    Query,
    /// `#access_token=..&refresh_token=..&type=..`, visible only in the browser.
    Hash,
    Both,
}

impl TokenSource {
    pub const fn query(self) -> bool {
        matches!(self, Self::Query | Self::Both)
    }

    pub const fn hash(self) -> bool {
        matches!(self, Self::Hash | Self::Both)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetRequest {
    Query {
        token: String,
        kind: String,
    },
    Fragment {
        access_token: String,
        refresh_token: Option<String>,
        kind: String,
    },
}

impl ResetRequest {
    pub fn from_query(query: &str) -> Option<Self> {
        let params = Params::parse(query.strip_prefix('?').unwrap_or(query));

        Some(Self::Query {
            token: params.get("token")?,
            kind: params.kind(),
        })
    }

    /// The server never sees a fragment; with [`Self::resolve`] this is the
    /// reference model the page script is tested against.
    pub fn from_fragment(fragment: &str) -> Option<Self> {
        let params = Params::parse(fragment.strip_prefix('#').unwrap_or(fragment));

        Some(Self::Fragment {
            access_token: params.get("access_token")?,
            refresh_token: params.get("refresh_token"),
            kind: params.kind(),
        })
    }

    /// Reference model of the redirect page script, not used when serving:
    /// the fragment wins over the query string, and only the sources allowed
    /// by `source` are consulted. `tests/page/script.rs` runs the real script
    /// and checks it lands on the same target.
    pub fn resolve(source: TokenSource, fragment: &str, query: &str) -> Option<Self> {
        let from_fragment = || {
            source
                .hash()
                .then(|| Self::from_fragment(fragment))
                .flatten()
        };
        let from_query = || source.query().then(|| Self::from_query(query)).flatten();

        from_fragment().or_else(from_query)
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Query { kind, .. } | Self::Fragment { kind, .. } => kind,
        }
    }

    fn params(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::Query { token, kind } => vec![("token", token.as_str()), ("type", kind.as_str())],
            Self::Fragment {
                access_token,
                refresh_token,
                kind,
            } => vec![
                ("access_token", access_token.as_str()),
                ("refresh_token", refresh_token.as_deref().unwrap_or_default()),
                ("type", kind.as_str()),
            ],
        }
    }
}

struct Params(Vec<(String, String)>);

impl Params {
    fn parse(input: &str) -> Self {
        Self(form_urlencoded::parse(input.as_bytes()).into_owned().collect())
    }

    /// First non-empty value for `key`, like `URLSearchParams.get` followed
    /// by a truthiness check.
    fn get(&self, key: &str) -> Option<String> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
            .filter(|v| !v.is_empty())
            .cloned()
    }

    fn kind(&self) -> String {
        self.get("type").unwrap_or_else(|| DEFAULT_TYPE.to_owned())
    }
}

/// `<scheme>://<host>/<route>`, checked once so that building a target per
/// request cannot fail.
#[derive(Debug, Clone)]
pub struct DeepLink {
    base: Url,
    home: Url,
}

impl DeepLink {
    pub fn new(scheme: &str, host: &str, route: &str) -> Result<Self, url::ParseError> {
        if host.is_empty() {
            return Err(url::ParseError::EmptyHost);
        }

        let home = Url::parse(&format!("{scheme}://{host}"))?;
        let base = Url::parse(&format!("{scheme}://{host}/{route}"))?;
        if base.cannot_be_a_base() || !base.has_host() {
            return Err(url::ParseError::EmptyHost);
        }

        Ok(Self { base, home })
    }

    /// The route without any parameters.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// The app's root, for when there is no token to hand over.
    pub fn home(&self) -> &Url {
        &self.home
    }

    pub fn target(&self, req: &ResetRequest) -> Url {
        let mut query = String::new();

        for (key, value) in req.params() {
            if !query.is_empty() {
                query.push('&');
            }
            // writing to a String never fails
            let _ = write!(
                query,
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            );
        }

        let mut url = self.base.clone();
        url.set_query(Some(&query));
        url
    }
}
