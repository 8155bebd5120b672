#![forbid(unsafe_code)]

mod cmd;
mod context;
mod identity;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use context::Context;
use output::OutputMode;
use std::env;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "together: a shared wishlist for two",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Act as this user (id or email). Overrides TOGETHER_USER.
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a wishlist project",
        long_about = "Create .together/ with a default config and database in the current directory.",
        after_help = "EXAMPLES:\n    tg init\n    tg init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(next_help_heading = "Setup", about = "Manage user profiles")]
    User {
        #[command(subcommand)]
        command: cmd::user::UserCommand,
    },

    #[command(
        next_help_heading = "Setup",
        about = "Show the current user",
        after_help = "EXAMPLES:\n    tg whoami\n    tg --user ana@example.com whoami --json"
    )]
    Whoami,

    #[command(
        next_help_heading = "Partner",
        about = "Show your invite code",
        long_about = "Show your invite code, creating one if needed. Your partner passes it to `tg link`."
    )]
    Invite,

    #[command(
        next_help_heading = "Partner",
        about = "Link with a partner",
        after_help = "EXAMPLES:\n    tg link K7Q2ZD"
    )]
    Link(cmd::link::LinkArgs),

    #[command(next_help_heading = "Partner", about = "Unlink from your partner")]
    Unlink,

    #[command(
        next_help_heading = "Wishes",
        about = "Add a wish",
        after_help = "EXAMPLES:\n    tg add --title \"Lisbon\" --category places\n    tg add -t \"Dune\" -c movies --url https://example.com/dune"
    )]
    Add(cmd::add::AddArgs),

    #[command(
        next_help_heading = "Wishes",
        about = "List wishes",
        long_about = "List the shared wishes, highest joint priority first.",
        after_help = "EXAMPLES:\n    tg list\n    tg list --category restaurants\n    tg list --done --json"
    )]
    List(cmd::list::ListArgs),

    #[command(next_help_heading = "Wishes", about = "Show one wish with comments")]
    Show(cmd::show::ShowArgs),

    #[command(next_help_heading = "Wishes", about = "Mark a wish as done")]
    Done(cmd::done::DoneArgs),

    #[command(next_help_heading = "Wishes", about = "Move a done wish back to the list")]
    Reopen(cmd::done::ReopenArgs),

    #[command(next_help_heading = "Wishes", about = "Delete a wish")]
    Delete(cmd::delete::DeleteArgs),

    #[command(
        next_help_heading = "Wishes",
        about = "Set your priority for a wish (1-5)",
        long_about = "Set your priority for a wish. Each partner votes once; the wish is ranked once both have voted.",
        after_help = "EXAMPLES:\n    tg vote 3f2a9c1e 5"
    )]
    Vote(cmd::vote::VoteArgs),

    #[command(next_help_heading = "Wishes", about = "Comment on a wish")]
    Comment(cmd::comment::CommentArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    tg completions bash\n    tg completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("TOGETHER_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "together=debug,info"
        } else {
            "together=info,warn"
        })
    });

    let format = env::var("TOGETHER_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let project_root = env::current_dir()?;

    if let Commands::Init(args) = &cli.command {
        return cmd::init::run_init(args, &project_root, OutputMode::from_json_flag(cli.json));
    }
    if let Commands::Completions(args) = &cli.command {
        let mut command = Cli::command();
        return cmd::completions::run_completions(args.shell, &mut command);
    }

    let ctx = Context::load(&project_root, cli.json, cli.user)?;
    match cli.command {
        Commands::User {
            command: cmd::user::UserCommand::Add(args),
        } => cmd::user::run_user_add(&args, &ctx).await,
        Commands::Whoami => cmd::user::run_whoami(&ctx).await,
        Commands::Invite => cmd::link::run_invite(&ctx).await,
        Commands::Link(args) => cmd::link::run_link(&args, &ctx).await,
        Commands::Unlink => cmd::link::run_unlink(&ctx).await,
        Commands::Add(args) => cmd::add::run_add(&args, &ctx).await,
        Commands::List(args) => cmd::list::run_list(&args, &ctx).await,
        Commands::Show(args) => cmd::show::run_show(&args, &ctx).await,
        Commands::Done(args) => cmd::done::run_done(&args, &ctx).await,
        Commands::Reopen(args) => cmd::done::run_reopen(&args, &ctx).await,
        Commands::Delete(args) => cmd::delete::run_delete(&args, &ctx).await,
        Commands::Vote(args) => cmd::vote::run_vote(&args, &ctx).await,
        Commands::Comment(args) => cmd::comment::run_comment(&args, &ctx).await,
        Commands::Init(_) | Commands::Completions(_) => Ok(()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    runtime.block_on(dispatch(cli))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_parses_before_and_after_subcommand() {
        let cli = Cli::parse_from(["tg", "--json", "list"]);
        assert!(cli.json);
        let cli = Cli::parse_from(["tg", "list", "--json"]);
        assert!(cli.json);
    }

    #[test]
    fn user_flag_parsed() {
        let cli = Cli::parse_from(["tg", "--user", "ana@example.com", "whoami"]);
        assert_eq!(cli.user.as_deref(), Some("ana@example.com"));
        assert!(matches!(cli.command, Commands::Whoami));
    }

    #[test]
    fn user_add_subcommand_parses() {
        let cli = Cli::parse_from(["tg", "user", "add", "--email", "a@b.c", "--name", "A"]);
        assert!(matches!(
            cli.command,
            Commands::User {
                command: cmd::user::UserCommand::Add(_)
            }
        ));
    }

    #[test]
    fn completions_subcommand_parses() {
        let cli = Cli::parse_from(["tg", "completions", "bash"]);
        assert!(matches!(
            cli.command,
            Commands::Completions(cmd::completions::CompletionsArgs {
                shell: clap_complete::Shell::Bash,
            })
        ));
    }

    #[test]
    fn all_subcommands_listed() {
        let subcommands = [
            vec!["tg", "init"],
            vec!["tg", "user", "add", "--email", "a@b.c", "--name", "A"],
            vec!["tg", "whoami"],
            vec!["tg", "invite"],
            vec!["tg", "link", "ABC123"],
            vec!["tg", "unlink"],
            vec!["tg", "add", "--title", "x", "--category", "games"],
            vec!["tg", "list", "--category", "all", "--done"],
            vec!["tg", "show", "w"],
            vec!["tg", "done", "w"],
            vec!["tg", "reopen", "w"],
            vec!["tg", "delete", "w"],
            vec!["tg", "vote", "w", "3"],
            vec!["tg", "comment", "w", "hello"],
            vec!["tg", "completions", "zsh"],
        ];
        for args in &subcommands {
            let result = Cli::try_parse_from(args.iter());
            assert!(result.is_ok(), "failed to parse {args:?}: {:?}", result.err());
        }
    }

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }
}
