//!
//! # Custom Error Handling
//!
//! This module defines `AppError`, the error type every service and page returns.
//! Provider and store failures are caught at the service boundary and converted
//! here, so callers only ever see one of the variants below. Each variant knows
//! the localized message shown to the user (`user_message`) and, through
//! `actix_web::error::ResponseError`, the HTTP response the local shell sends.
//!
//! `From` implementations exist for `validator::ValidationErrors`,
//! `jsonwebtoken::errors::Error`, `bcrypt::BcryptError` and the backend error
//! types, so the `?` operator works across all of them.

use actix_web::{error::ResponseError, HttpResponse};
use serde_json::json;
use std::fmt;
use validator::ValidationErrors;

use crate::backend::{ProviderError, StoreError};

/// Why a registration failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    EmailInUse,
    InvalidEmail,
    WeakPassword,
    /// The credential was created but the profile could not be written.
    /// The credential has been rolled back.
    ProfileWriteFailed(String),
    Unknown(String),
}

/// Why a login failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    NotFound,
    WrongPassword,
    InvalidCredential,
    Unknown(String),
}

/// A backend payload that does not have the shape of the expected record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub path: String,
    pub reason: String,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Malformed record at {}: {}", self.path, self.reason)
    }
}

/// Represents all possible errors that can occur within the application.
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    Registration(RegistrationError),
    Authentication(AuthenticationError),
    /// The identity provider could not end or check the session.
    Session(String),
    /// A write or read against the record store failed.
    Persistence(String),
    Decode(DecodeError),
    /// Input rejected before any network call. Carries the user-facing message.
    Validation(String),
    Unauthorized(String),
    NotFound(String),
    InternalServerError(String),
}

impl AppError {
    /// The localized message shown to the user in place of a dialog.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Registration(err) => match err {
                RegistrationError::EmailInUse => "Cet email est déjà utilisé".into(),
                RegistrationError::InvalidEmail => "Email invalide".into(),
                RegistrationError::WeakPassword => {
                    "Mot de passe trop faible (minimum 6 caractères)".into()
                }
                RegistrationError::ProfileWriteFailed(_) => {
                    "Impossible d'enregistrer votre profil, veuillez réessayer".into()
                }
                RegistrationError::Unknown(msg) => msg.clone(),
            },
            AppError::Authentication(err) => match err {
                AuthenticationError::NotFound => "Aucun compte trouvé avec cet email".into(),
                AuthenticationError::WrongPassword => "Mot de passe incorrect".into(),
                AuthenticationError::InvalidCredential => "Email ou mot de passe incorrect".into(),
                AuthenticationError::Unknown(msg) => msg.clone(),
            },
            AppError::Validation(msg) => msg.clone(),
            AppError::NotFound(_) => "Élément introuvable".into(),
            AppError::Unauthorized(_) => "Veuillez vous connecter".into(),
            AppError::Session(_)
            | AppError::Persistence(_)
            | AppError::Decode(_)
            | AppError::InternalServerError(_) => "Une erreur est survenue".into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Registration(RegistrationError::ProfileWriteFailed(msg)) => {
                write!(f, "Registration Error: profile write failed: {}", msg)
            }
            AppError::Registration(RegistrationError::Unknown(msg)) => {
                write!(f, "Registration Error: {}", msg)
            }
            AppError::Registration(err) => write!(f, "Registration Error: {:?}", err),
            AppError::Authentication(AuthenticationError::Unknown(msg)) => {
                write!(f, "Authentication Error: {}", msg)
            }
            AppError::Authentication(err) => write!(f, "Authentication Error: {:?}", err),
            AppError::Session(msg) => write!(f, "Session Error: {}", msg),
            AppError::Persistence(msg) => write!(f, "Persistence Error: {}", msg),
            AppError::Decode(err) => write!(f, "Decode Error: {}", err),
            AppError::Validation(msg) => write!(f, "Validation Error: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            AppError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
        }
    }
}

/// Converts `AppError` variants into JSON `HttpResponse`s for the local shell.
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let body = json!({
            "error": self.user_message(),
            "detail": self.to_string(),
        });
        match self {
            AppError::Registration(RegistrationError::EmailInUse) => {
                HttpResponse::Conflict().json(body)
            }
            AppError::Registration(RegistrationError::ProfileWriteFailed(_))
            | AppError::Registration(RegistrationError::Unknown(_)) => {
                HttpResponse::InternalServerError().json(body)
            }
            AppError::Registration(_) => HttpResponse::BadRequest().json(body),
            AppError::Authentication(_) | AppError::Unauthorized(_) => {
                HttpResponse::Unauthorized().json(body)
            }
            AppError::Session(_) => HttpResponse::ServiceUnavailable().json(body),
            AppError::Validation(_) => HttpResponse::UnprocessableEntity().json(body),
            AppError::NotFound(_) => HttpResponse::NotFound().json(body),
            // Store and decode failures are presented as generic internal errors.
            AppError::Persistence(_) | AppError::Decode(_) | AppError::InternalServerError(_) => {
                HttpResponse::InternalServerError().json(body)
            }
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(error: ValidationErrors) -> AppError {
        AppError::Validation(error.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(error: jsonwebtoken::errors::Error) -> AppError {
        AppError::Unauthorized(error.to_string())
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> AppError {
        AppError::InternalServerError(error.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> AppError {
        AppError::Persistence(error.to_string())
    }
}

impl From<DecodeError> for AppError {
    fn from(error: DecodeError) -> AppError {
        AppError::Decode(error)
    }
}

impl From<ProviderError> for RegistrationError {
    fn from(error: ProviderError) -> RegistrationError {
        match error {
            ProviderError::EmailAlreadyInUse => RegistrationError::EmailInUse,
            ProviderError::InvalidEmail => RegistrationError::InvalidEmail,
            ProviderError::WeakPassword => RegistrationError::WeakPassword,
            other => RegistrationError::Unknown(other.to_string()),
        }
    }
}

impl From<ProviderError> for AuthenticationError {
    fn from(error: ProviderError) -> AuthenticationError {
        match error {
            ProviderError::UserNotFound => AuthenticationError::NotFound,
            ProviderError::WrongPassword => AuthenticationError::WrongPassword,
            ProviderError::InvalidCredential | ProviderError::InvalidEmail => {
                AuthenticationError::InvalidCredential
            }
            other => AuthenticationError::Unknown(other.to_string()),
        }
    }
}
