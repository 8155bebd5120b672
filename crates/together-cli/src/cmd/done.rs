//! `tg done` and `tg reopen`: move a wish between the open and done lists.

use clap::Args;
use together_core::actions;

use crate::context::Context;
use crate::output::{fail, render_success};

#[derive(Args, Debug)]
pub struct DoneArgs {
    /// Wish ID to mark as done.
    pub id: String,
}

#[derive(Args, Debug)]
pub struct ReopenArgs {
    /// Wish ID to move back to the open list.
    pub id: String,
}

pub async fn run_done(args: &DoneArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let session = ctx.session(&store).await?;
    let wish = ctx.wish_in_group(&store, &session, &args.id).await?;

    actions::complete_wish(store.as_ref(), wish.id())
        .await
        .map_err(|e| fail(ctx.output, e))?;
    render_success(ctx.output, &format!("Marked '{}' as done", wish.row.title))
}

pub async fn run_reopen(args: &ReopenArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let session = ctx.session(&store).await?;
    let wish = ctx.wish_in_group(&store, &session, &args.id).await?;

    actions::reopen_wish(store.as_ref(), wish.id())
        .await
        .map_err(|e| fail(ctx.output, e))?;
    render_success(ctx.output, &format!("Reopened '{}'", wish.row.title))
}
