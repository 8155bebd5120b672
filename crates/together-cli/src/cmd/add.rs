//! `tg add`: put a new wish on the shared list.

use clap::Args;
use together_core::actions;
use together_core::model::wish::{Category, NewWish, Wish};

use crate::cmd::list::WishLine;
use crate::context::Context;
use crate::output::{fail, render_item};

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Short title for the wish.
    #[arg(short, long)]
    pub title: String,

    /// One of: places, restaurants, movies, games, events.
    #[arg(short, long)]
    pub category: Category,

    /// Optional longer description.
    #[arg(short, long)]
    pub description: Option<String>,

    /// Link to more information.
    #[arg(long)]
    pub url: Option<String>,

    /// Image to show with the wish.
    #[arg(long)]
    pub image_url: Option<String>,
}

pub async fn run_add(args: &AddArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let session = ctx.session(&store).await?;
    let group_id = ctx.require_group(&session)?;
    let created_by = session
        .user_id()
        .ok_or_else(|| anyhow::anyhow!("session ended unexpectedly"))?;

    let row = actions::add_wish(
        store.as_ref(),
        NewWish {
            group_id,
            category: args.category,
            title: args.title.clone(),
            description: args.description.clone(),
            image_url: args.image_url.clone(),
            source_url: args.url.clone(),
            created_by,
        },
    )
    .await
    .map_err(|e| fail(ctx.output, e))?;

    render_item(&WishLine::from(&Wish::from_row(row)), ctx.output)?;
    Ok(())
}
