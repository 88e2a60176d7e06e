//! Authentication State Machine
//!
//! ```text
//! Unknown ──startup──▶ Restoring ──ok──▶ Authenticated
//!                          │                  │  ▲
//!                          └─fail─▶ Guest ◀───┘  │ logout / failed refresh
//!                                   │  ▲         │
//!                            login  │  │ cancel  │
//!                                   ▼  │         │
//!                            Authenticating      │
//!                                   │            │
//!                         redirect  ▼            │
//!            deep link ──▶ ExchangingToken ──ok──┘
//! ```
//!
//! Restoring, Authenticating and ExchangingToken are only ever entered by the
//! caller holding the manager's in-flight slot.

use serde::{Deserialize, Serialize};

use crate::user::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// Nothing known yet; startup has not run
    Unknown,
    /// Checking the backend for a persisted credential
    Restoring,
    /// Browsing without an account
    Guest,
    /// Identity provider flow is open out of process
    Authenticating,
    /// One-time token is being exchanged for a credential
    ExchangingToken,
    /// Backend confirmed the user
    Authenticated,
}

impl AuthState {
    /// Check if transition to another state is valid
    pub fn can_transition_to(&self, target: AuthState) -> bool {
        match (self, target) {
            (AuthState::Unknown, AuthState::Restoring) => true,
            // A deep link can arrive before startup finished
            (AuthState::Unknown, AuthState::ExchangingToken) => true,
            (AuthState::Restoring, AuthState::Authenticated) => true,
            (AuthState::Guest, AuthState::Restoring) => true,
            (AuthState::Guest, AuthState::Authenticating) => true,
            (AuthState::Guest, AuthState::ExchangingToken) => true,
            (AuthState::Authenticating, AuthState::ExchangingToken) => true,
            (AuthState::ExchangingToken, AuthState::Authenticated) => true,
            (AuthState::Authenticated, AuthState::Restoring) => true,
            // Last successful exchange wins
            (AuthState::Authenticated, AuthState::ExchangingToken) => true,
            // Every failure, cancel and logout lands on Guest
            (_, AuthState::Guest) => true,
            (a, b) if *a == b => true,
            _ => false,
        }
    }

    /// States held only while a backend or provider call is outstanding
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthState::Restoring | AuthState::Authenticating | AuthState::ExchangingToken
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthState::Unknown => "unknown",
            AuthState::Restoring => "restoring",
            AuthState::Guest => "guest",
            AuthState::Authenticating => "authenticating",
            AuthState::ExchangingToken => "exchanging_token",
            AuthState::Authenticated => "authenticated",
        }
    }
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AuthState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unknown" => Ok(AuthState::Unknown),
            "restoring" => Ok(AuthState::Restoring),
            "guest" => Ok(AuthState::Guest),
            "authenticating" => Ok(AuthState::Authenticating),
            "exchanging_token" => Ok(AuthState::ExchangingToken),
            "authenticated" => Ok(AuthState::Authenticated),
            _ => Err(format!("Unknown auth state: {}", s)),
        }
    }
}

/// What consumers render: the state and, when signed in, the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthSnapshot {
    pub state: AuthState,
    pub user: Option<User>,
}

impl AuthSnapshot {
    /// True until startup settles and while any session call runs
    pub fn is_loading(&self) -> bool {
        self.state == AuthState::Unknown || self.state.is_transient()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated && self.user.is_some()
    }
}

impl Default for AuthSnapshot {
    fn default() -> Self {
        Self {
            state: AuthState::Unknown,
            user: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: AuthState,
    pub to: AuthState,
}
