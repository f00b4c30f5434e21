//! The current authenticated principal, owned explicitly.
//!
//! A `SessionStore` is built once at startup from the identity provider's
//! auth-state channel and shared by reference (`Arc`) with every consumer.

use futures::stream::{BoxStream, StreamExt};
use tokio::sync::watch;

use crate::backend::{IdentityProvider, Principal};

pub struct SessionStore {
    state: watch::Receiver<Option<Principal>>,
}

impl SessionStore {
    /// Subscribes to the provider's auth-state notifications for the lifetime
    /// of the store.
    pub fn new(provider: &dyn IdentityProvider) -> Self {
        Self {
            state: provider.auth_state(),
        }
    }

    pub fn current_principal(&self) -> Option<Principal> {
        self.state.borrow().clone()
    }

    /// Yields the current principal, then every change. Ends only when the
    /// provider itself goes away.
    pub fn auth_state_changes(&self) -> BoxStream<'static, Option<Principal>> {
        let mut rx = self.state.clone();
        rx.mark_changed();
        futures::stream::unfold(rx, |mut rx| async move {
            rx.changed().await.ok()?;
            let principal = rx.borrow_and_update().clone();
            Some((principal, rx))
        })
        .boxed()
    }
}
