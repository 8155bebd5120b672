//! `tg vote`: set your priority for a wish, once.

use clap::Args;
use serde::Serialize;
use std::io::Write;
use together_core::actions;

use crate::context::Context;
use crate::output::{fail, render};

#[derive(Args, Debug)]
pub struct VoteArgs {
    /// Wish ID.
    pub id: String,

    /// Priority from 1 (someday) to 5 (soon).
    #[arg(allow_negative_numbers = true)]
    pub value: i64,
}

#[derive(Debug, Serialize)]
struct VoteReport {
    wish_id: String,
    value: i64,
    average_priority: Option<f64>,
}

pub async fn run_vote(args: &VoteArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let session = ctx.session(&store).await?;
    let wish = ctx.wish_in_group(&store, &session, &args.id).await?;
    let user = session
        .user_id()
        .ok_or_else(|| anyhow::anyhow!("session ended unexpectedly"))?;

    actions::set_priority(store.as_ref(), wish.id(), &user, args.value)
        .await
        .map_err(|e| fail(ctx.output, e))?;

    let updated = ctx.wish_in_group(&store, &session, &args.id).await?;
    let report = VoteReport {
        wish_id: updated.id().to_string(),
        value: args.value,
        average_priority: updated.average_priority(),
    };
    render(ctx.output, &report, |report, w| match report.average_priority {
        Some(avg) => writeln!(w, "✓ Priority set. Shared priority is now {avg:.1}"),
        None => writeln!(w, "✓ Priority set. Waiting for your partner's vote"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_args_parse_value() {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            args: VoteArgs,
        }
        let w = Wrapper::parse_from(["test", "wish-1", "4"]);
        assert_eq!(w.args.value, 4);
        let w = Wrapper::parse_from(["test", "wish-1", "-2"]);
        assert_eq!(w.args.value, -2);
    }
}
