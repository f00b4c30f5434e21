pub mod extractors;
pub mod middleware;
pub mod password;
pub mod token;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::error::AppError;
use crate::models::user::EMAIL_REGEX;
use crate::models::Role;

// Re-export necessary items
pub use extractors::AuthenticatedPrincipal;
pub use middleware::SessionGuard;
pub use password::{hash_password, verify_password};
pub use token::{generate_token, verify_token, Claims};

pub const MSG_REQUIRED: &str = "Veuillez remplir tous les champs";
pub const MSG_EMAIL: &str = "Veuillez entrer un email valide";
pub const MSG_PASSWORD_LENGTH: &str = "Le mot de passe doit contenir au moins 6 caractères";
pub const MSG_PASSWORD_MISMATCH: &str = "Les mots de passe ne correspondent pas";

/// The login form as typed by the user.
#[derive(Debug, Default, Clone, Serialize, Deserialize, Validate)]
pub struct LoginForm {
    #[validate(regex(path = "EMAIL_REGEX", message = "Veuillez entrer un email valide"))]
    pub email: String,
    pub password: String,
}

impl LoginForm {
    /// Checks the form before any network call and returns the message to show.
    pub fn check(&self) -> Result<(), AppError> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(AppError::Validation(MSG_REQUIRED.into()));
        }
        self.validate()
            .map_err(|errors| first_message(&errors, &[("email", MSG_EMAIL)]))
    }
}

/// The registration form as typed by the user.
#[derive(Debug, Default, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterForm {
    #[validate(length(max = 100))]
    pub name: String,
    #[validate(regex(path = "EMAIL_REGEX", message = "Veuillez entrer un email valide"))]
    pub email: String,
    #[validate(length(min = 6, message = "Le mot de passe doit contenir au moins 6 caractères"))]
    pub password: String,
    #[serde(alias = "confirmPassword")]
    #[validate(must_match = "password")]
    pub confirm_password: String,
    pub role: Option<Role>,
}

impl RegisterForm {
    /// Checks the form in the order the user is told about problems: missing
    /// fields, mismatched confirmation, email format, then password length.
    pub fn check(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty()
            || self.email.trim().is_empty()
            || self.password.is_empty()
            || self.confirm_password.is_empty()
            || self.role.is_none()
        {
            return Err(AppError::Validation(MSG_REQUIRED.into()));
        }
        self.validate().map_err(|errors| {
            first_message(
                &errors,
                &[
                    ("confirm_password", MSG_PASSWORD_MISMATCH),
                    ("email", MSG_EMAIL),
                    ("password", MSG_PASSWORD_LENGTH),
                    ("name", MSG_REQUIRED),
                ],
            )
        })
    }
}

/// Picks the message of the first field, in priority order, that failed.
fn first_message(errors: &ValidationErrors, priority: &[(&str, &str)]) -> AppError {
    let failed = errors.field_errors();
    let message = priority
        .iter()
        .find(|(field, _)| failed.contains_key(*field))
        .map(|(_, message)| message.to_string())
        .unwrap_or_else(|| errors.to_string());
    AppError::Validation(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_form() -> RegisterForm {
        RegisterForm {
            name: "Alice".into(),
            email: "a@x.com".into(),
            password: "secret1".into(),
            confirm_password: "secret1".into(),
            role: Some(Role::Patient),
        }
    }

    fn message(result: Result<(), AppError>) -> String {
        match result {
            Err(AppError::Validation(msg)) => msg,
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_login_form_validation() {
        let valid = LoginForm {
            email: "a@x.com".into(),
            password: "secret1".into(),
        };
        assert!(valid.check().is_ok());

        let empty = LoginForm::default();
        assert_eq!(message(empty.check()), MSG_REQUIRED);

        let bad_email = LoginForm {
            email: "ax.com".into(),
            password: "secret1".into(),
        };
        assert_eq!(message(bad_email.check()), MSG_EMAIL);
    }

    #[test]
    fn test_register_form_validation_order() {
        assert!(register_form().check().is_ok());

        let mut missing_role = register_form();
        missing_role.role = None;
        assert_eq!(message(missing_role.check()), MSG_REQUIRED);

        // Mismatch wins over a malformed email.
        let mut mismatch = register_form();
        mismatch.confirm_password = "secret2".into();
        mismatch.email = "bad".into();
        assert_eq!(message(mismatch.check()), MSG_PASSWORD_MISMATCH);

        let mut bad_email = register_form();
        bad_email.email = "bad".into();
        assert_eq!(message(bad_email.check()), MSG_EMAIL);

        let mut short = register_form();
        short.password = "12345".into();
        short.confirm_password = "12345".into();
        assert_eq!(message(short.check()), MSG_PASSWORD_LENGTH);
    }
}
