//! `tg comment`: add to a wish's discussion.

use std::io::{self, Write};

use clap::Args;
use together_core::actions;
use together_core::model::comment::NewComment;

use crate::cmd::show::CommentLine;
use crate::context::Context;
use crate::output::{Renderable, fail, render_item};

#[derive(Args, Debug)]
pub struct CommentArgs {
    /// Wish ID.
    pub id: String,

    /// Comment text.
    pub text: String,
}

impl Renderable for CommentLine {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "✓ {} commented: {}",
            self.author.as_deref().unwrap_or("you"),
            self.text
        )
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *w, self).map_err(io::Error::other)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{}  {}", self.id, self.text)
    }
}

pub async fn run_comment(args: &CommentArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let session = ctx.session(&store).await?;
    let wish = ctx.wish_in_group(&store, &session, &args.id).await?;
    let user_id = session
        .user_id()
        .ok_or_else(|| anyhow::anyhow!("session ended unexpectedly"))?;

    let comment = actions::post_comment(
        store.as_ref(),
        NewComment {
            wish_id: wish.id().clone(),
            user_id,
            text: args.text.clone(),
        },
    )
    .await
    .map_err(|e| fail(ctx.output, e))?;
    render_item(&CommentLine::from(&comment), ctx.output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_args_parse() {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            args: CommentArgs,
        }
        let w = Wrapper::parse_from(["test", "wish-1", "let's go in May"]);
        assert_eq!(w.args.id, "wish-1");
        assert_eq!(w.args.text, "let's go in May");
    }
}
