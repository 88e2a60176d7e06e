//! Identity provider driven from the terminal
//!
//! Prints the provider URL for the user to open in a browser and waits for
//! the redirect URL to be pasted back.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

use aurum_core::{IdentityProvider, ProviderOutcome, SessionError};

pub struct ConsoleProvider {
    /// Embedded clients never see the redirect; it comes back as a deep link
    embedded: bool,
}

impl ConsoleProvider {
    pub fn new(embedded: bool) -> Self {
        Self { embedded }
    }
}

#[async_trait]
impl IdentityProvider for ConsoleProvider {
    async fn authenticate(
        &self,
        authorize_url: &Url,
        redirect_target: &str,
    ) -> Result<ProviderOutcome, SessionError> {
        println!("Open this URL to sign in:\n\n  {authorize_url}\n");

        if self.embedded {
            println!("The provider returns to {redirect_target}; pass that URL to `aurum open`.");
            return Ok(ProviderOutcome::HandedOff);
        }

        println!("Paste the URL you were sent back to (empty line to cancel):");
        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| SessionError::Provider(e.to_string()))?;

        let line = line.trim();
        if line.is_empty() {
            Ok(ProviderOutcome::Cancelled)
        } else {
            Ok(ProviderOutcome::Redirected(line.to_string()))
        }
    }
}
