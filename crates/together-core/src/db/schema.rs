//! SQLite schema for the embedded wishlist store.
//!
//! - v1: `users`, `wishes`, `comments`
//! - v2: `wish_priorities` (one vote per user per wish)
//!
//! A database left at v1 has no priority relation; enriched wish queries
//! fail against it and callers fall back to the reduced join.

/// Migration v1: profiles, wishes, and comments.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE CHECK (length(trim(email)) > 0),
    display_name TEXT NOT NULL CHECK (length(trim(display_name)) > 0),
    avatar_url TEXT,
    partner_id TEXT REFERENCES users(user_id) ON DELETE SET NULL,
    group_id TEXT,
    invite_code TEXT UNIQUE,
    push_token TEXT,
    created_at_us INTEGER NOT NULL,
    CHECK (partner_id IS NULL OR partner_id <> user_id)
);

CREATE TABLE IF NOT EXISTS wishes (
    wish_id TEXT PRIMARY KEY,
    group_id TEXT NOT NULL,
    category TEXT NOT NULL
        CHECK (category IN ('places', 'restaurants', 'movies', 'games', 'events')),
    title TEXT NOT NULL CHECK (length(trim(title)) > 0),
    description TEXT,
    image_url TEXT,
    source_url TEXT,
    created_by TEXT NOT NULL REFERENCES users(user_id),
    is_done INTEGER NOT NULL DEFAULT 0 CHECK (is_done IN (0, 1)),
    done_at_us INTEGER,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS comments (
    comment_id TEXT PRIMARY KEY,
    wish_id TEXT NOT NULL REFERENCES wishes(wish_id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(user_id),
    text TEXT NOT NULL CHECK (length(trim(text)) > 0),
    created_at_us INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_wishes_group_done_created
    ON wishes(group_id, is_done, created_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_wishes_group_category
    ON wishes(group_id, category);

CREATE INDEX IF NOT EXISTS idx_comments_wish_created
    ON comments(wish_id, created_at_us);
";

/// Migration v2: priority votes.
pub const MIGRATION_V2_SQL: &str = r"
CREATE TABLE IF NOT EXISTS wish_priorities (
    wish_id TEXT NOT NULL REFERENCES wishes(wish_id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    value INTEGER NOT NULL CHECK (value BETWEEN 1 AND 5),
    created_at_us INTEGER NOT NULL,
    PRIMARY KEY (wish_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_wish_priorities_user
    ON wish_priorities(user_id);
";

/// Indexes that must exist once fully migrated.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_wishes_group_done_created",
    "idx_wishes_group_category",
    "idx_comments_wish_created",
    "idx_wish_priorities_user",
];
