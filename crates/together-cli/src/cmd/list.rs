//! `tg list`: the shared list for one category and done state.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use together_core::model::wish::{Category, CategoryFilter, Wish};
use together_core::sync::LiveWishList;

use crate::context::Context;
use crate::output::{Renderable, fail, render_list};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Category to show: all, places, restaurants, movies, games, events.
    #[arg(short, long)]
    pub category: Option<CategoryFilter>,

    /// Show completed wishes instead of open ones.
    #[arg(long)]
    pub done: bool,

    /// Show open wishes even when the project config defaults to done.
    #[arg(long, conflicts_with = "done")]
    pub open: bool,
}

impl ListArgs {
    /// `--done` and `--open` override `[list] show_done`.
    pub const fn show_done(&self, config_default: bool) -> bool {
        if self.done {
            true
        } else if self.open {
            false
        } else {
            config_default
        }
    }
}

/// One row of a wish list.
#[derive(Debug, Serialize)]
pub struct WishLine {
    pub id: String,
    pub category: Category,
    pub title: String,
    pub is_done: bool,
    pub average_priority: Option<f64>,
    pub votes: usize,
    pub comment_count: u32,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Wish> for WishLine {
    fn from(wish: &Wish) -> Self {
        Self {
            id: wish.id().to_string(),
            category: wish.row.category,
            title: wish.row.title.clone(),
            is_done: wish.row.is_done,
            average_priority: wish.average_priority(),
            votes: wish.priority_votes.len(),
            comment_count: wish.comment_count,
            created_by: wish.creator.as_ref().map(|c| c.display_name.clone()),
            created_at: wish.row.created_at,
        }
    }
}

fn priority_label(average: Option<f64>, votes: usize) -> String {
    average.map_or_else(|| format!("-({votes}/2)"), |avg| format!("{avg:.1}"))
}

impl Renderable for WishLine {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let mark = if self.is_done { "x" } else { " " };
        writeln!(
            w,
            "[{mark}] {:<5} {:<12} {}",
            priority_label(self.average_priority, self.votes),
            self.category,
            self.title
        )?;
        writeln!(
            w,
            "      {}  by {}  {} comment(s)",
            self.id,
            self.created_by.as_deref().unwrap_or("?"),
            self.comment_count
        )
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *w, self).map_err(io::Error::other)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  {}  {}  {}",
            self.id,
            self.category,
            priority_label(self.average_priority, self.votes),
            self.title
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["ID", "CATEGORY", "PRIORITY", "TITLE"]
    }
}

pub async fn run_list(args: &ListArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let session = ctx.session(&store).await?;

    let list_config = &ctx.config.project.list;
    let scope = session.scope(
        args.category.unwrap_or(list_config.category),
        args.show_done(list_config.show_done),
    );
    if !scope.is_available() {
        tracing::info!("no partner linked; list is empty");
    }

    let list = LiveWishList::new(store, scope);
    list.refresh().await.map_err(|e| fail(ctx.output, e))?;

    let lines: Vec<WishLine> = list.wishes().iter().map(WishLine::from).collect();
    render_list(&lines, ctx.output)?;
    Ok(())
}
