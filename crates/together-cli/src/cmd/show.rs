//! `tg show`: one wish with its votes and comments.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use together_core::model::comment::Comment;
use together_core::model::wish::{Category, Wish};
use together_core::sync::CommentThread;

use crate::context::Context;
use crate::output::{Renderable, fail, pretty_kv, pretty_section, render_item};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Wish ID.
    pub id: String,
}

#[derive(Debug, Serialize)]
struct VoteLine {
    user_id: String,
    value: u8,
}

#[derive(Debug, Serialize)]
pub struct CommentLine {
    pub id: String,
    pub author: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Comment> for CommentLine {
    fn from(comment: &Comment) -> Self {
        Self {
            id: comment.id.to_string(),
            author: comment.author.as_ref().map(|a| a.display_name.clone()),
            text: comment.text.clone(),
            created_at: comment.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct WishDetail {
    id: String,
    category: Category,
    title: String,
    description: Option<String>,
    image_url: Option<String>,
    source_url: Option<String>,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
    is_done: bool,
    done_at: Option<DateTime<Utc>>,
    average_priority: Option<f64>,
    votes: Vec<VoteLine>,
    comments: Vec<CommentLine>,
}

impl WishDetail {
    fn new(wish: &Wish, comments: &[Comment]) -> Self {
        Self {
            id: wish.id().to_string(),
            category: wish.row.category,
            title: wish.row.title.clone(),
            description: wish.row.description.clone(),
            image_url: wish.row.image_url.clone(),
            source_url: wish.row.source_url.clone(),
            created_by: wish.creator.as_ref().map(|c| c.display_name.clone()),
            created_at: wish.row.created_at,
            is_done: wish.row.is_done,
            done_at: wish.row.done_at,
            average_priority: wish.average_priority(),
            votes: wish
                .priority_votes
                .iter()
                .map(|v| VoteLine {
                    user_id: v.user_id.to_string(),
                    value: v.value.get(),
                })
                .collect(),
            comments: comments.iter().map(CommentLine::from).collect(),
        }
    }
}

impl Renderable for WishDetail {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        pretty_section(w, &self.title)?;
        pretty_kv(w, "ID", &self.id)?;
        pretty_kv(w, "Category", self.category.as_str())?;
        pretty_kv(w, "Added by", self.created_by.as_deref().unwrap_or("?"))?;
        pretty_kv(w, "Added", self.created_at.format("%Y-%m-%d %H:%M").to_string())?;
        if let Some(done_at) = self.done_at {
            pretty_kv(w, "Done", done_at.format("%Y-%m-%d %H:%M").to_string())?;
        }
        if let Some(description) = &self.description {
            pretty_kv(w, "About", description)?;
        }
        if let Some(url) = &self.source_url {
            pretty_kv(w, "Link", url)?;
        }
        if let Some(url) = &self.image_url {
            pretty_kv(w, "Image", url)?;
        }
        let priority = self.average_priority.map_or_else(
            || format!("waiting for votes ({}/2)", self.votes.len()),
            |avg| format!("{avg:.1}"),
        );
        pretty_kv(w, "Priority", priority)?;

        if !self.comments.is_empty() {
            writeln!(w)?;
            pretty_section(w, "Comments")?;
            for comment in &self.comments {
                writeln!(
                    w,
                    "{} ({}): {}",
                    comment.author.as_deref().unwrap_or("?"),
                    comment.created_at.format("%Y-%m-%d %H:%M"),
                    comment.text
                )?;
            }
        }
        Ok(())
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *w, self).map_err(io::Error::other)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "id  {}", self.id)?;
        writeln!(w, "title  {}", self.title)?;
        writeln!(w, "category  {}", self.category)?;
        writeln!(w, "done  {}", self.is_done)?;
        match self.average_priority {
            Some(avg) => writeln!(w, "priority  {avg:.1}")?,
            None => writeln!(w, "priority  -")?,
        }
        for comment in &self.comments {
            writeln!(
                w,
                "comment  {}  {}",
                comment.author.as_deref().unwrap_or("?"),
                comment.text
            )?;
        }
        Ok(())
    }
}

pub async fn run_show(args: &ShowArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let session = ctx.session(&store).await?;
    let wish = ctx.wish_in_group(&store, &session, &args.id).await?;

    let thread = CommentThread::new(store.clone(), wish.id().clone());
    thread.refresh().await.map_err(|e| fail(ctx.output, e))?;

    render_item(&WishDetail::new(&wish, &thread.comments()), ctx.output)?;
    Ok(())
}
