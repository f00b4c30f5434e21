//! Page controllers.
//!
//! A page binds service calls to an explicit `ViewState` instead of opening
//! dialogs. Live data is followed by a background task that publishes each
//! emission into a `watch` channel; the task lives exactly as long as the
//! page's `Subscription` and is cancelled when the page closes or is dropped.

pub mod aidant_dashboard;
pub mod login;
pub mod patient_dashboard;
pub mod patient_details;
pub mod register;

use futures::stream::{BoxStream, StreamExt};
use log::warn;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::Principal;
use crate::error::AppError;
use crate::models::Role;
use crate::navigation::Route;
use crate::services::AuthService;

pub use aidant_dashboard::AidantDashboard;
pub use login::LoginPage;
pub use patient_dashboard::{MedicationForm, PatientDashboard};
pub use patient_details::PatientDetails;
pub use register::RegisterPage;

/// What a page region currently shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "lowercase")]
pub enum ViewState<T> {
    Idle,
    Loading,
    Ready(T),
    /// Carries the message shown to the user.
    Failed(String),
}

impl<T> ViewState<T> {
    pub fn is_settled(&self) -> bool {
        matches!(self, ViewState::Ready(_) | ViewState::Failed(_))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            ViewState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> ViewState<&T> {
        match self {
            ViewState::Idle => ViewState::Idle,
            ViewState::Loading => ViewState::Loading,
            ViewState::Ready(value) => ViewState::Ready(value),
            ViewState::Failed(msg) => ViewState::Failed(msg.clone()),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ViewState<U> {
        match self {
            ViewState::Idle => ViewState::Idle,
            ViewState::Loading => ViewState::Loading,
            ViewState::Ready(value) => ViewState::Ready(f(value)),
            ViewState::Failed(msg) => ViewState::Failed(msg),
        }
    }

    pub fn from_result(result: Result<T, AppError>) -> Self {
        match result {
            Ok(value) => ViewState::Ready(value),
            Err(err) => ViewState::Failed(err.user_message()),
        }
    }
}

impl<T> Default for ViewState<T> {
    fn default() -> Self {
        ViewState::Idle
    }
}

/// Lets the signed-in user onto a page meant for `role`, returning the
/// principal and profile name, or the route to show instead.
pub(crate) async fn admit(auth: &AuthService, role: Role) -> Result<(Principal, String), Route> {
    let principal = auth.current_principal().ok_or(Route::Login)?;
    match auth.get_user_data(&principal.uid).await {
        Ok(Some(user)) if user.role != role => Err(Route::dashboard_for(user.role)),
        Ok(Some(user)) => Ok((principal, user.name)),
        Ok(None) => {
            warn!("{} has no profile", principal.uid);
            Ok((principal, String::new()))
        }
        Err(err) => {
            warn!("could not load profile of {}: {}", principal.uid, err);
            Ok((principal, String::new()))
        }
    }
}

/// A live query followed on behalf of a page.
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Follows `stream`, replacing the published state on every emission.
    /// Returns the receiving side, which starts out `Loading`.
    pub fn follow<T>(
        mut stream: BoxStream<'static, Result<T, AppError>>,
    ) -> (Self, watch::Receiver<ViewState<T>>)
    where
        T: Send + Sync + 'static,
    {
        let (tx, rx) = watch::channel(ViewState::Loading);
        let handle = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                if let Err(err) = &item {
                    warn!("live view failed: {}", err);
                }
                if tx.send(ViewState::from_result(item)).is_err() {
                    break;
                }
            }
        });
        (Self { handle }, rx)
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A live region of a page: the subscription feeding it and what it shows.
pub struct LiveView<T> {
    subscription: Option<Subscription>,
    state: watch::Receiver<ViewState<T>>,
}

impl<T: Clone + Send + Sync + 'static> LiveView<T> {
    pub fn idle() -> Self {
        let (_, state) = watch::channel(ViewState::Idle);
        Self {
            subscription: None,
            state,
        }
    }

    /// Replaces whatever was followed before.
    pub fn follow(&mut self, stream: BoxStream<'static, Result<T, AppError>>) {
        let (subscription, state) = Subscription::follow(stream);
        self.subscription = Some(subscription);
        self.state = state;
    }

    pub fn current(&self) -> ViewState<T> {
        self.state.borrow().clone()
    }

    /// Waits until the region shows data or an error.
    pub async fn settled(&mut self) -> ViewState<T> {
        let settled = self
            .state
            .wait_for(ViewState::is_settled)
            .await
            .map(|state| state.clone());
        settled.unwrap_or_else(|_| self.current())
    }

    /// Waits for the next published state.
    pub async fn changed(&mut self) -> ViewState<T> {
        let _ = self.state.changed().await;
        self.current()
    }

    pub fn is_following(&self) -> bool {
        self.subscription.as_ref().map_or(false, Subscription::is_active)
    }

    /// Cancels the live query; the last state stays visible.
    pub fn stop(&mut self) {
        self.subscription = None;
    }
}
