//! Registration, login, logout and profile lookups.
//!
//! Composes the identity provider with the `users/{uid}` profile records of the
//! record store. Provider error codes are mapped to `RegistrationError` and
//! `AuthenticationError` here; no raw provider error leaves this module.

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use log::{error, info, warn};
use serde_json::Value;

use crate::backend::{DbPath, IdentityProvider, Principal, RecordStore, Snapshot};
use crate::error::{AppError, DecodeError, RegistrationError};
use crate::mapper;
use crate::models::{Role, User};
use crate::navigation::Route;
use crate::session::SessionStore;

const USERS: &str = "users";

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginOutcome {
    pub principal: Principal,
    /// The dashboard to open, `None` when the account has no profile.
    pub destination: Option<Route>,
}

pub struct AuthService {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn RecordStore>,
    session: Arc<SessionStore>,
}

impl AuthService {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn RecordStore>,
        session: Arc<SessionStore>,
    ) -> Self {
        Self {
            identity,
            store,
            session,
        }
    }

    fn user_path(uid: &str) -> Result<DbPath, AppError> {
        DbPath::parse(USERS)?
            .child(uid)
            .map_err(|_| AppError::NotFound(format!("No user '{}'", uid)))
    }

    /// Creates the credential, then the profile keyed by the new uid.
    ///
    /// If the profile cannot be written the credential is deleted again, so a
    /// failed registration never leaves an account without a profile.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
        role: Role,
    ) -> Result<Principal, AppError> {
        let principal = self
            .identity
            .create_user(email, password)
            .await
            .map_err(|e| AppError::Registration(e.into()))?;

        let profile = User::new(&principal.uid, &principal.email, name.trim(), role);
        match self.write_profile(&profile).await {
            Ok(()) => {
                info!("registered {} as {}", principal.uid, role);
                Ok(principal)
            }
            Err(err) => {
                error!("profile write for {} failed: {}", principal.uid, err);
                if let Err(rollback) = self.identity.delete_current_user().await {
                    error!(
                        "could not roll back credential {}: {}; account has no profile",
                        principal.uid, rollback
                    );
                }
                Err(AppError::Registration(
                    RegistrationError::ProfileWriteFailed(err.to_string()),
                ))
            }
        }
    }

    async fn write_profile(&self, profile: &User) -> Result<(), AppError> {
        let path = Self::user_path(&profile.uid)?;
        let value = mapper::encode(profile)?;
        self.store.set(&path, value).await?;
        Ok(())
    }

    /// Authenticates and resolves the dashboard matching the user's role.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AppError> {
        let principal = self
            .identity
            .sign_in(email, password)
            .await
            .map_err(|e| AppError::Authentication(e.into()))?;

        let role = match self.get_user_role(&principal.uid).await {
            Ok(role) => role,
            Err(err) => {
                warn!("role lookup for {} failed: {}", principal.uid, err);
                None
            }
        };
        if role.is_none() {
            warn!("{} signed in without a profile", principal.uid);
        }
        info!("{} logged in", principal.uid);
        Ok(LoginOutcome {
            principal,
            destination: role.map(Route::dashboard_for),
        })
    }

    pub async fn logout(&self) -> Result<(), AppError> {
        self.identity
            .sign_out()
            .await
            .map_err(|e| AppError::Session(e.to_string()))?;
        info!("signed out");
        Ok(())
    }

    pub fn current_principal(&self) -> Option<Principal> {
        self.session.current_principal()
    }

    pub fn is_logged_in(&self) -> bool {
        self.current_principal().is_some()
    }

    /// Reads a profile once. An absent profile is `Ok(None)`.
    pub async fn get_user_data(&self, uid: &str) -> Result<Option<User>, AppError> {
        let Ok(path) = Self::user_path(uid) else {
            return Ok(None);
        };
        let snapshot = self.store.get(&path).await?;
        Ok(mapper::decode(&snapshot)?)
    }

    pub async fn get_user_role(&self, uid: &str) -> Result<Option<Role>, AppError> {
        Ok(self.get_user_data(uid).await?.map(|user| user.role))
    }

    /// Live profile of one user; `None` while it does not exist.
    pub fn watch_user(&self, uid: &str) -> BoxStream<'static, Result<Option<User>, AppError>> {
        let path = match Self::user_path(uid) {
            Ok(path) => path,
            Err(err) => return futures::stream::once(async move { Err(err) }).boxed(),
        };
        self.store
            .watch(&path, None)
            .map(|snapshot| -> Result<Option<User>, AppError> {
                Ok(mapper::decode(&snapshot?)?)
            })
            .boxed()
    }

    /// Live directory of every patient. Each item is the complete list.
    pub fn get_all_patients(&self) -> BoxStream<'static, Result<Vec<User>, AppError>> {
        let path = match DbPath::parse(USERS) {
            Ok(path) => path,
            Err(err) => return futures::stream::once(async move { Err(err.into()) }).boxed(),
        };
        self.store
            .watch(&path, None)
            .map(|snapshot| -> Result<Vec<User>, AppError> { Ok(patients_in(&snapshot?)?) })
            .boxed()
    }
}

/// Keeps the children whose raw role is `patient`, then decodes them, so a
/// malformed caregiver profile cannot hide the patient list.
fn patients_in(snapshot: &Snapshot) -> Result<Vec<User>, DecodeError> {
    let patient = Value::from(Role::Patient.as_str());
    let mut patients = Vec::new();
    for child in snapshot.children() {
        let is_patient = child.value().and_then(|v| v.get("role")) == Some(&patient);
        if !is_patient {
            continue;
        }
        if let Some(user) = mapper::decode::<User>(&child)? {
            patients.push(user);
        }
    }
    Ok(patients)
}
