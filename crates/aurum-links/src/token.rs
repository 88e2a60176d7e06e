//! Session token extraction for inbound deep links
//!
//! The provider appends `session_id=<value>` either to the fragment or to the
//! query string of the redirect target. Only the first `#session_id=` or
//! `?session_id=` occurrence counts, and the value runs until the next `&`
//! or the end of the URL. The value is passed through untouched.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static SESSION_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[#?]session_id=([^&]+)").expect("static pattern compiles"));

/// One-time token issued by the identity provider.
///
/// Never printed in full: `Debug` and `Display` redact the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Pull the session token out of a redirect or deep-link URL.
pub fn extract_session_token(url: &str) -> Option<SessionToken> {
    SESSION_ID_PATTERN
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| SessionToken::new(m.as_str()))
}

/// What an inbound URL means for the session layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkResolution {
    /// The URL carries a provider token to exchange
    Session(SessionToken),
    /// Nothing for the session layer; left to the display layer
    Ignored,
}

impl LinkResolution {
    pub fn resolve(url: &str) -> Self {
        let url = url.trim();
        if url.is_empty() {
            return LinkResolution::Ignored;
        }

        match extract_session_token(url) {
            Some(token) => LinkResolution::Session(token),
            None => LinkResolution::Ignored,
        }
    }
}
