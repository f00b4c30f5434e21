use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    // Something, an '@', something, a dot, something; no whitespace.
    pub static ref EMAIL_REGEX: regex::Regex =
        regex::Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// What a user is to the application. Fixed at registration.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    /// A caregiver following one or more patients.
    Aidant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Aidant => "aidant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user profile as stored under `users/{uid}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Identifier assigned by the identity provider.
    pub uid: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    #[serde(
        rename = "photoURL",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::mapper::empty_as_none"
    )]
    pub photo_url: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::mapper::empty_as_none"
    )]
    pub phone_number: Option<String>,
}

impl User {
    pub fn new(uid: &str, email: &str, name: &str, role: Role) -> Self {
        Self {
            uid: uid.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            role,
            created_at: Utc::now(),
            photo_url: None,
            phone_number: None,
        }
    }
}
