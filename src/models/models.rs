use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account identifier used as the authorization subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored account record. `password` holds the hash and never leaves the store.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub nick: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
    pub updated_at: Option<String>,
}

/// Public view of a [`User`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub nick: String,
    pub email: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            nick: user.nick.clone(),
            email: user.email.clone(),
            created_at: user.created_at.clone(),
            updated_at: user.updated_at.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author_id: String,
    pub author_nick: String,
    pub likes: u64,
    pub created_at: String,
}

/// Registration and profile-edit payload.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct NewUser {
    pub name: String,
    pub nick: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct PasswordChange {
    pub current: String,
    pub new: String,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct PostInput {
    pub title: String,
    pub content: String,
}

/// Login response.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Session {
    pub id: String,
    pub token: String,
}

pub type Followings = Vec<String>;
