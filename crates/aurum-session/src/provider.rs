//! Identity provider seam
//!
//! The provider flow runs out of process (system browser, auth sheet, page
//! navigation). The session layer only needs to know how it ended.

use async_trait::async_trait;
use url::Url;

use aurum_links::{LaunchEnvironment, ProviderLink};

use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    /// Flow finished and returned to the redirect target with this URL
    Redirected(String),
    /// User closed the flow
    Cancelled,
    /// Control left the client (embedded page navigated away); the result
    /// comes back later as a deep link
    HandedOff,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, authorize_url: &Url, redirect_target: &str)
        -> Result<ProviderOutcome>;
}

/// Where login sends the user and how they come back
#[derive(Debug, Clone)]
pub struct LoginRoute {
    provider: ProviderLink,
    environment: LaunchEnvironment,
    /// Used as the callback when an embedded client does not know its origin
    fallback: Url,
}

impl LoginRoute {
    pub fn new(provider: ProviderLink, environment: LaunchEnvironment, fallback: Url) -> Self {
        Self {
            provider,
            environment,
            fallback,
        }
    }

    pub fn environment(&self) -> &LaunchEnvironment {
        &self.environment
    }

    pub fn redirect_target(&self) -> String {
        self.environment.redirect_target(&self.fallback)
    }

    pub fn authorize_url(&self) -> (Url, String) {
        let redirect = self.redirect_target();
        (self.provider.authorize_url(&redirect), redirect)
    }
}
