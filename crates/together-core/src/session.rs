//! Current-user context: profile, partner linking, and the list scope it
//! implies.
//!
//! A [`Session`] is constructed explicitly and passed by reference to
//! whatever needs the current user. Signing out clears it.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::info;

use crate::error::TogetherError;
use crate::filter::WishScope;
use crate::model::user::{User, generate_invite_code, normalize_invite_code};
use crate::model::wish::CategoryFilter;
use crate::model::{GroupId, UserId};
use crate::store::{ProfileStore, StoreError};

/// Attempts at finding an unused invite code before giving up.
const INVITE_ATTEMPTS: usize = 5;

pub struct Session {
    store: Rc<dyn ProfileStore>,
    user: RefCell<Option<User>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user.borrow().as_ref().map(|u| u.id.clone()))
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Load `user_id`'s profile and start a session for it.
    ///
    /// # Errors
    ///
    /// [`TogetherError::UserNotFound`] if no such user exists, or
    /// [`TogetherError::FetchFailed`] if the store cannot be read.
    pub async fn start(store: Rc<dyn ProfileStore>, user_id: &UserId) -> Result<Self, TogetherError> {
        let user = store
            .user_by_id(user_id)
            .await
            .map_err(TogetherError::FetchFailed)?
            .ok_or_else(|| TogetherError::UserNotFound(user_id.to_string()))?;
        info!(user_id = %user.id, linked = user.is_linked(), "session started");
        Ok(Self {
            store,
            user: RefCell::new(Some(user)),
        })
    }

    /// Current profile, or `None` after sign-out.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.user.borrow().clone()
    }

    fn require_user(&self) -> Result<User, TogetherError> {
        self.user()
            .ok_or_else(|| TogetherError::UserNotFound("signed out".to_string()))
    }

    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user.borrow().as_ref().map(|u| u.id.clone())
    }

    #[must_use]
    pub fn group_id(&self) -> Option<GroupId> {
        self.user.borrow().as_ref().and_then(|u| u.group_id.clone())
    }

    /// List scope for this user. Unavailable (no group) until linked.
    #[must_use]
    pub fn scope(&self, category: CategoryFilter, done: bool) -> WishScope {
        WishScope {
            group_id: self.group_id(),
            category,
            done,
        }
    }

    /// Reload the profile from the store.
    ///
    /// # Errors
    ///
    /// [`TogetherError::UserNotFound`] if the user vanished or the session
    /// was signed out, [`TogetherError::FetchFailed`] on store errors.
    pub async fn refresh(&self) -> Result<User, TogetherError> {
        let current = self.require_user()?;
        let user = self
            .store
            .user_by_id(&current.id)
            .await
            .map_err(TogetherError::FetchFailed)?
            .ok_or_else(|| TogetherError::UserNotFound(current.id.to_string()))?;
        *self.user.borrow_mut() = Some(user.clone());
        Ok(user)
    }

    pub fn sign_out(&self) {
        if let Some(user) = self.user.borrow_mut().take() {
            info!(user_id = %user.id, "signed out");
        }
    }

    /// This user's invite code, generating and saving one if needed.
    ///
    /// # Errors
    ///
    /// [`TogetherError::WriteFailed`] if no code can be saved.
    pub async fn create_invite(&self) -> Result<String, TogetherError> {
        let user = self.require_user()?;
        if let Some(code) = user.invite_code {
            return Ok(code);
        }

        let mut last_error = None;
        for _ in 0..INVITE_ATTEMPTS {
            let code = generate_invite_code(&mut rand::thread_rng());
            match self.store.set_invite_code(&user.id, &code).await {
                Ok(()) => {
                    self.refresh().await?;
                    return Ok(code);
                }
                Err(StoreError::Conflict(reason)) => {
                    last_error = Some(StoreError::Conflict(reason));
                }
                Err(other) => return Err(TogetherError::WriteFailed(other)),
            }
        }
        Err(TogetherError::WriteFailed(last_error.unwrap_or_else(|| {
            StoreError::Conflict("no free invite code".to_string())
        })))
    }

    /// Link with the partner who owns `code`. Returns the new group id.
    ///
    /// # Errors
    ///
    /// [`TogetherError::InvalidInviteCode`] for malformed or unknown codes,
    /// [`TogetherError::SelfLink`] for the user's own code, and store
    /// failures as [`TogetherError::FetchFailed`] or
    /// [`TogetherError::WriteFailed`].
    pub async fn link_partner(&self, code: &str) -> Result<GroupId, TogetherError> {
        let user = self.require_user()?;
        let code =
            normalize_invite_code(code).ok_or_else(|| TogetherError::InvalidInviteCode(code.to_string()))?;

        let partner = self
            .store
            .user_by_invite_code(&code)
            .await
            .map_err(TogetherError::FetchFailed)?
            .ok_or_else(|| TogetherError::InvalidInviteCode(code.clone()))?;
        if partner.id == user.id {
            return Err(TogetherError::SelfLink);
        }

        let group_id = GroupId::for_pair(&user.id, &partner.id);
        self.store
            .link_group(&user.id, &partner.id, &group_id)
            .await
            .map_err(TogetherError::WriteFailed)?;
        self.refresh().await?;
        info!(group_id = %group_id, partner = %partner.id, "linked partner");
        Ok(group_id)
    }

    /// Dissolve the current partnership for both partners.
    ///
    /// # Errors
    ///
    /// [`TogetherError::NotLinked`] if there is no partner, or
    /// [`TogetherError::WriteFailed`].
    pub async fn unlink(&self) -> Result<(), TogetherError> {
        let user = self.require_user()?;
        if !user.is_linked() {
            return Err(TogetherError::NotLinked(user.id.to_string()));
        }
        self.store
            .unlink_group(&user.id)
            .await
            .map_err(TogetherError::WriteFailed)?;
        self.refresh().await?;
        info!(user_id = %user.id, "unlinked partner");
        Ok(())
    }
}
