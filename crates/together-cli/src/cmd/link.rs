//! `tg invite`, `tg link`, and `tg unlink`: partner pairing.

use clap::Args;
use serde::Serialize;
use std::io::Write;

use crate::context::Context;
use crate::output::{fail, render, render_success};

#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Invite code from your partner's `tg invite`.
    pub code: String,
}

#[derive(Debug, Serialize)]
struct InviteReport {
    code: String,
}

#[derive(Debug, Serialize)]
struct LinkReport {
    group_id: String,
    partner_id: Option<String>,
}

pub async fn run_invite(ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let session = ctx.session(&store).await?;
    let code = session
        .create_invite()
        .await
        .map_err(|e| fail(ctx.output, e))?;

    render(ctx.output, &InviteReport { code }, |report, w| {
        writeln!(w, "{}", report.code)
    })
}

pub async fn run_link(args: &LinkArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let session = ctx.session(&store).await?;
    let group_id = session
        .link_partner(&args.code)
        .await
        .map_err(|e| fail(ctx.output, e))?;

    let report = LinkReport {
        group_id: group_id.to_string(),
        partner_id: session
            .user()
            .and_then(|u| u.partner_id)
            .map(|id| id.to_string()),
    };
    render(ctx.output, &report, |report, w| {
        writeln!(w, "✓ Linked. Shared list: {}", report.group_id)
    })
}

pub async fn run_unlink(ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let session = ctx.session(&store).await?;
    session.unlink().await.map_err(|e| fail(ctx.output, e))?;
    render_success(ctx.output, "Unlinked from partner")
}
