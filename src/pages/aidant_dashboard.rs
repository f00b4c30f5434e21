use std::sync::Arc;

use crate::error::AppError;
use crate::models::{Role, User};
use crate::navigation::Route;
use crate::services::AuthService;

use super::{admit, LiveView, ViewState};

/// The caregiver's home: their name and the live patient directory.
pub struct AidantDashboard {
    auth: Arc<AuthService>,
    user_name: String,
    patients: LiveView<Vec<User>>,
}

impl AidantDashboard {
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self {
            auth,
            user_name: String::new(),
            patients: LiveView::idle(),
        }
    }

    pub async fn open(&mut self) -> Option<Route> {
        match admit(&self.auth, Role::Aidant).await {
            Ok((_, name)) => self.user_name = name,
            Err(route) => return Some(route),
        }
        self.patients.follow(self.auth.get_all_patients());
        None
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn patients(&self) -> ViewState<Vec<User>> {
        self.patients.current()
    }

    pub async fn settled_patients(&mut self) -> ViewState<Vec<User>> {
        self.patients.settled().await
    }

    pub async fn next_patients(&mut self) -> ViewState<Vec<User>> {
        self.patients.changed().await
    }

    pub fn open_patient(&self, uid: &str) -> Route {
        Route::PatientDetails(uid.to_string())
    }

    pub fn close(&mut self) {
        self.patients.stop();
    }

    pub async fn logout(&mut self) -> Result<Route, AppError> {
        self.close();
        self.auth.logout().await?;
        Ok(Route::Login)
    }
}
