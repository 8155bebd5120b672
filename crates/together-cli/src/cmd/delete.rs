//! `tg delete`: remove a wish from the shared list.

use clap::Args;
use together_core::model::wish::CategoryFilter;
use together_core::sync::LiveWishList;

use crate::context::Context;
use crate::output::{fail, render_success};

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Wish ID to delete.
    pub id: String,
}

/// Deletes through the list the wish appears in, so a rejected delete
/// leaves that list as it was.
pub async fn run_delete(args: &DeleteArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let session = ctx.session(&store).await?;
    let wish = ctx.wish_in_group(&store, &session, &args.id).await?;

    let list = LiveWishList::new(
        store.clone(),
        session.scope(CategoryFilter::All, wish.row.is_done),
    );
    list.refresh().await.map_err(|e| fail(ctx.output, e))?;
    list.delete_wish(wish.id())
        .await
        .map_err(|e| fail(ctx.output, e))?;

    tracing::debug!(remaining = list.wishes().len(), "wish deleted");
    render_success(ctx.output, &format!("Deleted '{}'", wish.row.title))
}
