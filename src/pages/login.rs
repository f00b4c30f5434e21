use std::sync::Arc;

use log::info;

use crate::auth::LoginForm;
use crate::backend::Principal;
use crate::error::AppError;
use crate::navigation::Route;
use crate::services::AuthService;

use super::ViewState;

pub struct LoginPage {
    auth: Arc<AuthService>,
    pub form: LoginForm,
    state: ViewState<Option<Route>>,
    principal: Option<Principal>,
}

impl LoginPage {
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self {
            auth,
            form: LoginForm::default(),
            state: ViewState::Idle,
            principal: None,
        }
    }

    pub fn with_form(auth: Arc<AuthService>, form: LoginForm) -> Self {
        Self {
            form,
            ..Self::new(auth)
        }
    }

    /// Validates the form, then signs in. `Ready(None)` means the account
    /// has no profile and the page stays where it is.
    pub async fn submit(&mut self) -> Result<Option<Route>, AppError> {
        if let Err(err) = self.form.check() {
            self.state = ViewState::Failed(err.user_message());
            return Err(err);
        }

        self.state = ViewState::Loading;
        match self.auth.login(self.form.email.trim(), &self.form.password).await {
            Ok(outcome) => {
                if let Some(route) = &outcome.destination {
                    info!("login navigates to {}", route);
                }
                self.principal = Some(outcome.principal);
                self.state = ViewState::Ready(outcome.destination.clone());
                Ok(outcome.destination)
            }
            Err(err) => {
                self.state = ViewState::Failed(err.user_message());
                Err(err)
            }
        }
    }

    pub fn state(&self) -> &ViewState<Option<Route>> {
        &self.state
    }

    /// The principal signed in by the last successful submit.
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn go_to_register(&self) -> Route {
        Route::Register
    }
}
