use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{GroupId, UserId};

/// Length of a partner invite code.
pub const INVITE_CODE_LEN: usize = 6;

const INVITE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub partner_id: Option<UserId>,
    pub group_id: Option<GroupId>,
    pub invite_code: Option<String>,
    pub push_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub const fn is_linked(&self) -> bool {
        self.partner_id.is_some() && self.group_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
}

/// Random uppercase base-36 invite code.
#[must_use]
pub fn generate_invite_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..INVITE_CODE_LEN)
        .map(|_| char::from(INVITE_ALPHABET[rng.gen_range(0..INVITE_ALPHABET.len())]))
        .collect()
}

/// Uppercase and validate user-entered invite code text.
#[must_use]
pub fn normalize_invite_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    let valid = code.len() == INVITE_CODE_LEN
        && code.bytes().all(|b| INVITE_ALPHABET.contains(&b));
    valid.then_some(code)
}
