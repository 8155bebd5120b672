//! Per-invocation context: resolved config, the project store, and the
//! current user's session.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context as _, Result};
use together_core::config::{self, EffectiveConfig, PROJECT_DIR};
use together_core::db::SqliteStore;
use together_core::error::{ErrorCode, TogetherError};
use together_core::model::wish::Wish;
use together_core::model::{GroupId, UserId, WishId};
use together_core::session::Session;
use together_core::store::{ProfileStore, WishStore};
use together_core::sync::with_join_fallback;

use crate::identity;
use crate::output::{CliError, OutputMode, fail, render_error};

pub struct Context {
    pub root: PathBuf,
    pub config: EffectiveConfig,
    pub output: OutputMode,
    user_flag: Option<String>,
}

impl Context {
    /// Resolve config for `root`. Parse failures are reported before
    /// returning.
    pub fn load(root: &Path, cli_json: bool, user_flag: Option<String>) -> Result<Self> {
        let config = match config::resolve_config(root, cli_json) {
            Ok(config) => config,
            Err(err) => {
                render_error(
                    OutputMode::from_json_flag(cli_json),
                    &CliError::from_code(ErrorCode::ConfigParseError, format!("{err:#}")),
                )?;
                return Err(err);
            }
        };
        let output = OutputMode::from_resolved(&config.resolved_output);
        Ok(Self {
            root: root.to_path_buf(),
            config,
            output,
            user_flag,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        config::database_path(&self.root, &self.config.project)
    }

    /// Open the project database. Fails if `tg init` has not run here.
    pub fn open_store(&self) -> Result<Rc<SqliteStore>> {
        if !self.root.join(PROJECT_DIR).is_dir() {
            render_error(
                self.output,
                &CliError::from_code(
                    ErrorCode::NotInitialized,
                    format!("no {PROJECT_DIR}/ directory in {}", self.root.display()),
                ),
            )?;
            anyhow::bail!("{}", ErrorCode::NotInitialized.message());
        }
        let path = self.database_path();
        let store = SqliteStore::open(&path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Ok(Rc::new(store))
    }

    /// Start a session for the resolved current user.
    pub async fn session(&self, store: &Rc<SqliteStore>) -> Result<Session> {
        let Some(identity) = identity::resolve_user(
            self.user_flag.as_deref(),
            self.config.user.user.as_deref(),
        ) else {
            render_error(
                self.output,
                &CliError::from_code(
                    ErrorCode::UserNotFound,
                    "no current user; set --user, TOGETHER_USER, or `user` in the user config",
                ),
            )?;
            anyhow::bail!("{}", ErrorCode::UserNotFound.message());
        };

        let user_id = if identity::is_email(&identity) {
            store
                .user_by_email(&identity)
                .await
                .map_err(|e| fail(self.output, TogetherError::FetchFailed(e)))?
                .ok_or_else(|| fail(self.output, TogetherError::UserNotFound(identity.clone())))?
                .id
        } else {
            UserId::new(identity)
        };

        Session::start(store.clone(), &user_id)
            .await
            .map_err(|e| fail(self.output, e))
    }

    /// The session's group, or a reported [`TogetherError::NotLinked`].
    pub fn require_group(&self, session: &Session) -> Result<GroupId> {
        session.group_id().ok_or_else(|| {
            let user = session.user_id().map(|id| id.to_string()).unwrap_or_default();
            fail(self.output, TogetherError::NotLinked(user))
        })
    }

    /// Load a wish that belongs to the session's group. Wishes of other
    /// groups are reported as not found.
    pub async fn wish_in_group(
        &self,
        store: &SqliteStore,
        session: &Session,
        id: &str,
    ) -> Result<Wish> {
        let group = self.require_group(session)?;
        let id = WishId::new(id);
        let id_ref = &id;
        let (wish, _) = with_join_fallback(move |join| store.wish_by_id(id_ref, join))
            .await
            .map_err(|e| fail(self.output, TogetherError::FetchFailed(e)))?;
        match wish {
            Some(wish) if wish.row.group_id == group => Ok(wish),
            _ => Err(fail(self.output, TogetherError::WishNotFound(id.to_string()))),
        }
    }
}
