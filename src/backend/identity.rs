//! In-process identity provider.
//!
//! Mirrors the hosted provider's observable contract: email/password accounts,
//! one signed-in user per process, auth-state notifications and bearer ID
//! tokens. Passwords are stored as bcrypt hashes and ID tokens are HS256 JWTs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use log::{debug, info};
use tokio::sync::watch;
use uuid::Uuid;

use super::{IdentityProvider, Principal, ProviderError};
use crate::auth::{hash_password, token, verify_password};
use crate::models::user::is_valid_email;

const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    uid: String,
    email: String,
    password_hash: String,
}

pub struct LocalIdentityProvider {
    accounts: Mutex<HashMap<String, Account>>,
    state: watch::Sender<Option<Principal>>,
    secret: String,
    ttl_hours: i64,
    bcrypt_cost: u32,
}

impl LocalIdentityProvider {
    pub fn new(secret: impl Into<String>, ttl_hours: i64, bcrypt_cost: u32) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            state,
            secret: secret.into(),
            ttl_hours,
            bcrypt_cost,
        }
    }

    fn accounts(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Account>>, ProviderError> {
        self.accounts
            .lock()
            .map_err(|_| ProviderError::Other("account table lock poisoned".into()))
    }

    fn start_session(&self, uid: &str, email: &str) -> Result<Principal, ProviderError> {
        let id_token = token::generate_token(uid, email, &self.secret, self.ttl_hours)
            .map_err(|e| ProviderError::Other(e.to_string()))?;
        let principal = Principal {
            uid: uid.to_string(),
            email: email.to_string(),
            id_token,
        };
        self.state.send_replace(Some(principal.clone()));
        Ok(principal)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn create_user(&self, email: &str, password: &str) -> Result<Principal, ProviderError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(ProviderError::InvalidEmail);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ProviderError::WeakPassword);
        }
        if self.accounts()?.contains_key(&email) {
            return Err(ProviderError::EmailAlreadyInUse);
        }

        let password_hash = hash_password(password, self.bcrypt_cost)
            .map_err(|e| ProviderError::Other(e.to_string()))?;
        let uid = Uuid::new_v4().simple().to_string();
        {
            let mut accounts = self.accounts()?;
            // Another registration may have won the race while hashing.
            if accounts.contains_key(&email) {
                return Err(ProviderError::EmailAlreadyInUse);
            }
            accounts.insert(
                email.clone(),
                Account {
                    uid: uid.clone(),
                    email: email.clone(),
                    password_hash,
                },
            );
        }
        info!("identity: created account {}", uid);
        self.start_session(&uid, &email)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, ProviderError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(ProviderError::InvalidEmail);
        }
        let (uid, stored_email, password_hash) = {
            let accounts = self.accounts()?;
            let account = accounts.get(&email).ok_or(ProviderError::UserNotFound)?;
            (
                account.uid.clone(),
                account.email.clone(),
                account.password_hash.clone(),
            )
        };
        let matches = verify_password(password, &password_hash)
            .map_err(|_| ProviderError::InvalidCredential)?;
        if !matches {
            return Err(ProviderError::WrongPassword);
        }
        debug!("identity: {} signed in", uid);
        self.start_session(&uid, &stored_email)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.state.send_replace(None);
        Ok(())
    }

    async fn delete_current_user(&self) -> Result<(), ProviderError> {
        let current = self.current_user().ok_or(ProviderError::UserNotFound)?;
        self.accounts()?
            .retain(|_, account| account.uid != current.uid);
        info!("identity: deleted account {}", current.uid);
        self.state.send_replace(None);
        Ok(())
    }

    fn current_user(&self) -> Option<Principal> {
        self.state.borrow().clone()
    }

    fn auth_state(&self) -> watch::Receiver<Option<Principal>> {
        self.state.subscribe()
    }

    fn verify_id_token(&self, id_token: &str) -> Result<Principal, ProviderError> {
        let claims =
            token::verify_token(id_token, &self.secret).map_err(|_| ProviderError::InvalidCredential)?;
        match self.current_user() {
            Some(current) if current.uid == claims.sub => Ok(Principal {
                uid: claims.sub,
                email: claims.email,
                id_token: id_token.to_string(),
            }),
            // Tokens of a session that has since ended are no longer honoured.
            _ => Err(ProviderError::InvalidCredential),
        }
    }
}
