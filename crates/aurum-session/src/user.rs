//! Signed-in user profile

use serde::{Deserialize, Serialize};

/// Profile as returned by the backend. Read-only on the client.
///
/// The exchange endpoint names the identifier `id`, the `/me` endpoint
/// `user_id`; both decode into [`User::id`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "user_id")]
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
    /// Grams of gold held; not part of the exchange response
    #[serde(default)]
    pub gold_balance: f64,
}
