use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::data::UserService;
use crate::model::User;
use crate::storage::{self, KnownUser};
use crate::validate::SignUpForm;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not signed in")]
    NotSignedIn,
    #[error("user id required")]
    MissingUserId,
}

/// Who is signed in. Components read the current actor from here instead of
/// holding their own copy.
pub struct Session {
    store: Option<Arc<storage::Store>>,
    current: RwLock<Option<User>>,
}

impl Session {
    /// Restores the user persisted by a previous run, if any.
    pub fn new(store: Arc<storage::Store>) -> Result<Self> {
        let current = match store.load_current_user() {
            Ok(user) => user,
            Err(err) => {
                warn!(error = %err, "discarding unreadable session user");
                store.clear_current_user()?;
                None
            }
        };
        Ok(Self {
            store: Some(store),
            current: RwLock::new(current),
        })
    }

    /// Session that is never written to disk.
    pub fn ephemeral() -> Self {
        Self {
            store: None,
            current: RwLock::new(None),
        }
    }

    pub fn current_user(&self) -> Option<User> {
        self.current.read().clone()
    }

    pub fn current_user_id(&self) -> Option<String> {
        self.current.read().as_ref().map(|user| user.id.clone())
    }

    pub fn is_signed_in(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn require_user_id(&self) -> Result<String, SessionError> {
        self.current_user_id().ok_or(SessionError::NotSignedIn)
    }

    /// Replaces the current user and persists it.
    pub fn set_user(&self, user: User) -> Result<()> {
        if let Some(store) = &self.store {
            store.save_current_user(&user)?;
        }
        *self.current.write() = Some(user);
        Ok(())
    }

    pub fn sign_in(&self, users: &dyn UserService, user_id: &str) -> Result<User> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(SessionError::MissingUserId.into());
        }
        let user = users
            .user(user_id)
            .with_context(|| format!("sign in as {user_id}"))?;
        self.set_user(user.clone())?;
        info!(user = %user.id, "signed in");
        Ok(user)
    }

    pub fn sign_up(
        &self,
        users: &dyn UserService,
        form: &SignUpForm,
        today: NaiveDate,
    ) -> Result<User> {
        let new_user = form.validate(today)?;
        let user = users.create(&new_user)?;
        self.set_user(user.clone())?;
        info!(user = %user.id, "signed up");
        Ok(user)
    }

    pub fn sign_out(&self) -> Result<()> {
        if let Some(store) = &self.store {
            store.clear_current_user()?;
        }
        if let Some(user) = self.current.write().take() {
            info!(user = %user.id, "signed out");
        }
        Ok(())
    }

    /// Re-reads the current user from the API after it changed remotely.
    pub fn refresh(&self, users: &dyn UserService) -> Result<Option<User>> {
        let Some(user_id) = self.current_user_id() else {
            return Ok(None);
        };
        let user = users.user(&user_id).context("refresh current user")?;
        self.set_user(user.clone())?;
        Ok(Some(user))
    }

    pub fn known_users(&self) -> Result<Vec<KnownUser>> {
        match &self.store {
            Some(store) => store.list_known_users(),
            None => Ok(Vec::new()),
        }
    }
}
