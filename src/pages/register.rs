use std::sync::Arc;

use log::warn;

use crate::auth::RegisterForm;
use crate::error::AppError;
use crate::navigation::Route;
use crate::services::AuthService;

use super::ViewState;

pub struct RegisterPage {
    auth: Arc<AuthService>,
    pub form: RegisterForm,
    state: ViewState<Route>,
}

impl RegisterPage {
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self::with_form(auth, RegisterForm::default())
    }

    pub fn with_form(auth: Arc<AuthService>, form: RegisterForm) -> Self {
        Self {
            auth,
            form,
            state: ViewState::Idle,
        }
    }

    /// Creates the account and sends the user to the login page.
    pub async fn submit(&mut self) -> Result<Route, AppError> {
        let result = self.try_submit().await;
        self.state = match &result {
            Ok(route) => ViewState::Ready(route.clone()),
            Err(err) => ViewState::Failed(err.user_message()),
        };
        result
    }

    async fn try_submit(&mut self) -> Result<Route, AppError> {
        self.form.check()?;
        let role = self
            .form
            .role
            .ok_or_else(|| AppError::Validation(crate::auth::MSG_REQUIRED.into()))?;

        self.state = ViewState::Loading;
        self.auth
            .register(
                self.form.email.trim(),
                &self.form.password,
                &self.form.name,
                role,
            )
            .await?;
        // Registration signs the new account in; the user logs in explicitly.
        // The account exists either way, so a failed sign-out is only logged.
        if let Err(err) = self.auth.logout().await {
            warn!("could not sign out {} after registering: {}", self.form.email.trim(), err);
        }
        Ok(Route::Login)
    }

    pub fn state(&self) -> &ViewState<Route> {
        &self.state
    }

    pub fn go_to_login(&self) -> Route {
        Route::Login
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MSG_PASSWORD_MISMATCH;
    use crate::backend::{
        IdentityProvider, LocalIdentityProvider, MemoryStore, Principal, ProviderError,
    };
    use crate::models::Role;
    use crate::session::SessionStore;
    use async_trait::async_trait;
    use tokio::sync::watch;

    /// A provider whose sign-out never goes through.
    struct StuckSession(LocalIdentityProvider);

    #[async_trait]
    impl IdentityProvider for StuckSession {
        async fn create_user(&self, email: &str, password: &str) -> Result<Principal, ProviderError> {
            self.0.create_user(email, password).await
        }

        async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, ProviderError> {
            self.0.sign_in(email, password).await
        }

        async fn sign_out(&self) -> Result<(), ProviderError> {
            Err(ProviderError::Other("network unreachable".into()))
        }

        async fn delete_current_user(&self) -> Result<(), ProviderError> {
            self.0.delete_current_user().await
        }

        fn current_user(&self) -> Option<Principal> {
            self.0.current_user()
        }

        fn auth_state(&self) -> watch::Receiver<Option<Principal>> {
            self.0.auth_state()
        }

        fn verify_id_token(&self, token: &str) -> Result<Principal, ProviderError> {
            self.0.verify_id_token(token)
        }
    }

    fn auth() -> Arc<AuthService> {
        let identity = Arc::new(LocalIdentityProvider::new("test_secret", 1, 4));
        let session = Arc::new(SessionStore::new(identity.as_ref()));
        Arc::new(AuthService::new(identity, Arc::new(MemoryStore::new()), session))
    }

    fn form() -> RegisterForm {
        RegisterForm {
            name: "Alice".into(),
            email: "a@x.com".into(),
            password: "secret1".into(),
            confirm_password: "secret1".into(),
            role: Some(Role::Patient),
        }
    }

    #[tokio::test]
    async fn test_register_lands_on_login() {
        let auth = auth();
        let mut page = RegisterPage::with_form(auth.clone(), form());
        assert_eq!(page.submit().await.unwrap(), Route::Login);
        assert_eq!(page.state(), &ViewState::Ready(Route::Login));
        assert!(!auth.is_logged_in());

        let outcome = auth.login("a@x.com", "secret1").await.unwrap();
        assert_eq!(outcome.destination, Some(Route::PatientDashboard));
    }

    #[tokio::test]
    async fn test_failed_sign_out_still_lands_on_login() {
        let identity = Arc::new(StuckSession(LocalIdentityProvider::new("test_secret", 1, 4)));
        let session = Arc::new(SessionStore::new(identity.as_ref()));
        let store = Arc::new(MemoryStore::new());
        let auth = Arc::new(AuthService::new(identity, store, session));

        let mut page = RegisterPage::with_form(auth.clone(), form());
        assert_eq!(page.submit().await.unwrap(), Route::Login);
        assert_eq!(page.state(), &ViewState::Ready(Route::Login));
        let uid = auth.current_principal().unwrap().uid;
        assert!(auth.get_user_data(&uid).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_reported() {
        let auth = auth();
        RegisterPage::with_form(auth.clone(), form())
            .submit()
            .await
            .unwrap();

        let mut again = RegisterPage::with_form(auth, form());
        assert!(again.submit().await.is_err());
        assert_eq!(
            again.state(),
            &ViewState::Failed("Cet email est déjà utilisé".into())
        );
    }

    #[tokio::test]
    async fn test_mismatched_confirmation() {
        let mut bad = form();
        bad.confirm_password = "secret2".into();
        let mut page = RegisterPage::with_form(auth(), bad);
        assert!(page.submit().await.is_err());
        assert_eq!(page.state(), &ViewState::Failed(MSG_PASSWORD_MISMATCH.into()));
    }
}
