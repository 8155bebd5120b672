//! Current-user resolution for CLI commands.
//!
//! The resolution chain: `--user` flag > `TOGETHER_USER` env > `user` in the
//! user config. The resolved value is a user id or an email address.

use std::env;

/// Environment reader trait for dependency injection in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

fn resolve_user_with(
    cli_flag: Option<&str>,
    config_user: Option<&str>,
    env: &dyn EnvReader,
) -> Option<String> {
    if let Some(user) = cli_flag.map(str::trim).filter(|u| !u.is_empty()) {
        return Some(user.to_string());
    }

    if let Some(val) = env.get("TOGETHER_USER") {
        return Some(val.trim().to_string());
    }

    config_user
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
}

/// Resolve who is running the command, or `None` if nothing names a user.
pub fn resolve_user(cli_flag: Option<&str>, config_user: Option<&str>) -> Option<String> {
    resolve_user_with(cli_flag, config_user, &RealEnv)
}

/// Whether an identity string should be looked up by email.
pub fn is_email(identity: &str) -> bool {
    identity.contains('@')
}
