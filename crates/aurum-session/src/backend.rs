//! Backend session endpoints
//!
//! | call        | request                                   | success body            |
//! |-------------|-------------------------------------------|-------------------------|
//! | exchange    | `POST /api/auth/session {"session_id"}`   | profile + session_token |
//! | current     | `GET /api/auth/me`                        | profile                 |
//! | logout      | `POST /api/auth/logout`                   | ignored                 |
//!
//! The credential travels both as the `session_token` cookie and as a bearer
//! header, since the backend accepts either and a secure cookie is not
//! replayed over plain HTTP.

use async_trait::async_trait;
use cookie::Cookie;
use parking_lot::RwLock;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use aurum_links::SessionToken;

use crate::credentials::CredentialStore;
use crate::error::SessionError;
use crate::user::User;
use crate::Result;

/// Cookie the backend sets on a successful exchange
pub const SESSION_COOKIE: &str = "session_token";

const EXCHANGE_PATH: &str = "api/auth/session";
const CURRENT_USER_PATH: &str = "api/auth/me";
const LOGOUT_PATH: &str = "api/auth/logout";

#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Trade a one-time provider token for a credential and the profile
    async fn exchange(&self, token: &SessionToken) -> Result<User>;

    /// Profile for the credential currently held
    async fn current_user(&self) -> Result<User>;

    /// Ask the backend to invalidate the credential. The local copy is
    /// dropped whatever the backend answers.
    async fn logout(&self) -> Result<()>;

    /// Drop the local copy of the credential without a network call
    fn forget(&self);
}

#[derive(Serialize)]
struct ExchangeRequest<'a> {
    session_id: &'a str,
}

#[derive(Deserialize)]
struct ExchangeResponse {
    id: String,
    email: String,
    name: String,
    #[serde(default)]
    picture: Option<String>,
    #[serde(default)]
    session_token: Option<String>,
}

impl ExchangeResponse {
    fn into_parts(self) -> (User, Option<String>) {
        let user = User {
            id: self.id,
            email: self.email,
            name: self.name,
            picture: self.picture,
            gold_balance: 0.0,
        };
        (user, self.session_token)
    }
}

pub struct HttpSessionBackend {
    client: Client,
    base_url: Url,
    jar: Arc<Jar>,
    credentials: Arc<dyn CredentialStore>,
    credential: RwLock<Option<String>>,
}

impl HttpSessionBackend {
    pub fn new(base_url: Url, credentials: Arc<dyn CredentialStore>) -> Result<Self> {
        let base_url = with_trailing_slash(base_url);
        let jar = Arc::new(Jar::default());

        let credential = credentials.load()?;
        if let Some(value) = credential.as_deref() {
            jar.add_cookie_str(&format!("{SESSION_COOKIE}={value}; Path=/"), &base_url);
            tracing::debug!(backend = %base_url, "Loaded persisted credential");
        }

        let client = Client::builder()
            .cookie_provider(jar.clone())
            .build()?;

        Ok(Self {
            client,
            base_url,
            jar,
            credentials,
            credential: RwLock::new(credential),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn has_credential(&self) -> bool {
        self.credential.read().is_some()
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.credential.read().as_deref() {
            Some(credential) => request.bearer_auth(credential),
            None => request,
        }
    }

    fn remember(&self, credential: String) {
        if let Err(e) = self.credentials.save(&credential) {
            // Still usable for this process; only the restart loses it
            tracing::warn!(error = %e, "Failed to persist session credential");
        }
        *self.credential.write() = Some(credential);
    }

    /// Credential as set by the exchange response's `Set-Cookie`
    fn cookie_credential(&self) -> Option<String> {
        let header = self.jar.cookies(&self.base_url)?;
        let cookies = header.to_str().ok()?;
        Cookie::split_parse(cookies)
            .filter_map(|cookie| cookie.ok())
            .find(|cookie| cookie.name() == SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
    }
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    async fn exchange(&self, token: &SessionToken) -> Result<User> {
        let response = self
            .client
            .post(self.endpoint(EXCHANGE_PATH)?)
            .json(&ExchangeRequest {
                session_id: token.as_str(),
            })
            .send()
            .await?;
        let response = ensure_success(response)?;

        let body: ExchangeResponse = response.json().await?;
        let (user, session_token) = body.into_parts();
        match session_token.or_else(|| self.cookie_credential()) {
            Some(credential) => self.remember(credential),
            None => tracing::warn!("Exchange succeeded without a session credential"),
        }

        Ok(user)
    }

    async fn current_user(&self) -> Result<User> {
        let response = self
            .authorized(self.client.get(self.endpoint(CURRENT_USER_PATH)?))
            .send()
            .await?;

        match ensure_success(response) {
            Ok(response) => Ok(response.json().await?),
            Err(e) => {
                if e.is_unauthorized() {
                    // Expired or revoked; no point replaying it next start
                    self.forget();
                }
                Err(e)
            }
        }
    }

    async fn logout(&self) -> Result<()> {
        let result = match self.endpoint(LOGOUT_PATH) {
            Ok(url) => self.authorized(self.client.post(url)).send().await,
            Err(e) => {
                self.forget();
                return Err(e);
            }
        };
        self.forget();

        ensure_success(result?)?;
        Ok(())
    }

    fn forget(&self) {
        *self.credential.write() = None;
        self.jar.add_cookie_str(
            &format!("{SESSION_COOKIE}=; Path=/; Max-Age=0"),
            &self.base_url,
        );
        if let Err(e) = self.credentials.clear() {
            tracing::warn!(error = %e, "Failed to clear persisted session credential");
        }
    }
}

fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SessionError::Status(status.as_u16()))
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
