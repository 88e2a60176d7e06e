//! Outbound provider links
//!
//! The provider needs to know where to send the user once they have signed
//! in. An embedded client (hosted in a page) is sent back to its own origin;
//! a standalone app is re-entered through its URL scheme.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::LinkError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum LaunchEnvironment {
    /// Running inside a navigable page. `origin` is the page origin when known.
    Embedded { origin: Option<Url> },
    /// Native app reached through a custom URL scheme.
    Standalone { scheme: String },
}

impl LaunchEnvironment {
    pub fn standalone(scheme: &str) -> Result<Self> {
        let scheme = scheme.trim().trim_end_matches("://").trim_end_matches(':');
        if !is_valid_scheme(scheme) {
            return Err(LinkError::InvalidScheme(scheme.to_string()));
        }

        Ok(LaunchEnvironment::Standalone {
            scheme: scheme.to_ascii_lowercase(),
        })
    }

    pub fn embedded(origin: &str) -> Result<Self> {
        let origin = Url::parse(origin.trim())?;
        Ok(LaunchEnvironment::Embedded {
            origin: Some(origin),
        })
    }

    /// Callback target handed to the provider.
    ///
    /// `fallback` is used by an embedded client that cannot see its own
    /// origin; in practice that is the backend base URL.
    pub fn redirect_target(&self, fallback: &Url) -> String {
        match self {
            LaunchEnvironment::Embedded {
                origin: Some(origin),
            } => format!("{}/", origin.origin().ascii_serialization()),
            LaunchEnvironment::Embedded { origin: None } => {
                format!("{}/", fallback.as_str().trim_end_matches('/'))
            }
            LaunchEnvironment::Standalone { scheme } => format!("{scheme}:///"),
        }
    }

    /// Whether the provider flow leaves the current page (embedded) instead
    /// of returning a redirect URL to the caller (standalone).
    pub fn is_embedded(&self) -> bool {
        matches!(self, LaunchEnvironment::Embedded { .. })
    }
}

// RFC 3986: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Identity provider entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderLink {
    base: Url,
}

impl ProviderLink {
    pub fn new(base: &str) -> Result<Self> {
        let base = Url::parse(base.trim())?;
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `<base>/?redirect=<url-encoded target>`
    pub fn authorize_url(&self, redirect_target: &str) -> Url {
        let mut url = self.base.clone();
        url.set_fragment(None);
        url.query_pairs_mut()
            .clear()
            .append_pair("redirect", redirect_target);

        tracing::debug!(provider = %self.base, redirect = %redirect_target, "Built provider URL");
        url
    }
}
