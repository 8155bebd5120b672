//! `tg user add` and `tg whoami`.

use std::io::{self, Write};

use clap::{Args, Subcommand};
use serde::Serialize;
use together_core::error::TogetherError;
use together_core::model::user::{NewUser, User};
use together_core::store::ProfileStore;

use crate::context::Context;
use crate::output::{Renderable, fail, pretty_kv, pretty_section, render_item};

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    #[command(
        about = "Create a user profile",
        after_help = "EXAMPLES:\n    tg user add --email ana@example.com --name Ana"
    )]
    Add(UserAddArgs),
}

#[derive(Args, Debug)]
pub struct UserAddArgs {
    /// Email address; also accepted by --user.
    #[arg(long)]
    pub email: String,

    /// Name shown to your partner.
    #[arg(long)]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub partner_id: Option<String>,
    pub group_id: Option<String>,
    pub invite_code: Option<String>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            partner_id: user.partner_id.as_ref().map(ToString::to_string),
            group_id: user.group_id.as_ref().map(ToString::to_string),
            invite_code: user.invite_code.clone(),
        }
    }
}

impl Renderable for UserView {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        pretty_section(w, &self.display_name)?;
        pretty_kv(w, "ID", &self.id)?;
        pretty_kv(w, "Email", &self.email)?;
        pretty_kv(w, "Partner", self.partner_id.as_deref().unwrap_or("(none)"))?;
        if let Some(code) = &self.invite_code {
            pretty_kv(w, "Invite", code)?;
        }
        Ok(())
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *w, self).map_err(io::Error::other)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  {}  {}  {}",
            self.id,
            self.email,
            self.display_name,
            self.partner_id.as_deref().unwrap_or("-")
        )
    }
}

pub async fn run_user_add(args: &UserAddArgs, ctx: &Context) -> anyhow::Result<()> {
    let email = args.email.trim();
    if !email.contains('@') {
        anyhow::bail!("'{email}' is not an email address");
    }
    let store = ctx.open_store()?;
    let user = store
        .create_user(NewUser {
            email: email.to_string(),
            display_name: args.name.trim().to_string(),
        })
        .await
        .map_err(|e| fail(ctx.output, TogetherError::WriteFailed(e)))?;
    tracing::info!(user_id = %user.id, "created user");
    render_item(&UserView::from(&user), ctx.output)?;
    Ok(())
}

pub async fn run_whoami(ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let session = ctx.session(&store).await?;
    let user = session
        .user()
        .ok_or_else(|| anyhow::anyhow!("session ended unexpectedly"))?;
    render_item(&UserView::from(&user), ctx.output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use together_core::model::{GroupId, UserId};

    #[test]
    fn user_view_flattens_ids() {
        let user = User {
            id: UserId::from("u1"),
            email: "ana@example.com".into(),
            display_name: "Ana".into(),
            avatar_url: None,
            partner_id: Some(UserId::from("u2")),
            group_id: Some(GroupId::from("u1_u2")),
            invite_code: None,
            push_token: None,
            created_at: Utc::now(),
        };
        let view = UserView::from(&user);
        assert_eq!(view.partner_id.as_deref(), Some("u2"));
        assert_eq!(view.group_id.as_deref(), Some("u1_u2"));

        let mut buf = Vec::new();
        view.render_table(&mut buf).expect("render");
        assert_eq!(
            String::from_utf8(buf).expect("utf8"),
            "u1  ana@example.com  Ana  u2\n"
        );
    }
}
