//! SQL for wish, comment, vote, and user reads.
//!
//! All functions take a shared `&Connection` and return typed model structs.

use chrono::{DateTime, Utc};
use rusqlite::types::{ToSql, Type};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde::Deserialize;

use crate::model::comment::Comment;
use crate::model::user::User;
use crate::model::vote::{PriorityValue, PriorityVote};
use crate::model::wish::{Category, CategoryFilter, Wish, WishRow};
use crate::model::{CommentId, Creator, GroupId, UserId, WishId};
use crate::store::{JoinSpec, WishQuery};

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

const WISH_COLUMNS: &str = "w.wish_id, w.group_id, w.category, w.title, w.description, \
     w.image_url, w.source_url, w.created_by, w.is_done, w.done_at_us, w.created_at_us";

const WISH_COLUMN_COUNT: usize = 11;

const CREATOR_COLUMNS: &str = "u.user_id, u.display_name, \
     (SELECT COUNT(*) FROM comments c WHERE c.wish_id = w.wish_id) AS comment_count";

const VOTES_COLUMN: &str = "(SELECT json_group_array(json_object('user_id', p.user_id, 'value', p.value)) \
     FROM (SELECT user_id, value FROM wish_priorities \
           WHERE wish_id = w.wish_id ORDER BY created_at_us, user_id) p) AS votes_json";

const USER_COLUMNS: &str = "user_id, email, display_name, avatar_url, partner_id, group_id, \
     invite_code, push_token, created_at_us";

const COMMENT_SELECT: &str = "SELECT c.comment_id, c.wish_id, c.user_id, c.text, c.created_at_us, \
     u.display_name FROM comments c LEFT JOIN users u ON u.user_id = c.user_id";

fn wish_select(join: JoinSpec) -> String {
    match join {
        JoinSpec::Enriched => format!(
            "SELECT {WISH_COLUMNS}, {CREATOR_COLUMNS}, {VOTES_COLUMN} \
             FROM wishes w LEFT JOIN users u ON u.user_id = w.created_by"
        ),
        JoinSpec::Reduced => format!(
            "SELECT {WISH_COLUMNS}, {CREATOR_COLUMNS} \
             FROM wishes w LEFT JOIN users u ON u.user_id = w.created_by"
        ),
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

pub(crate) fn micros_to_datetime(idx: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, micros))
}

fn opt_micros_to_datetime(
    idx: usize,
    micros: Option<i64>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    micros.map(|m| micros_to_datetime(idx, m)).transpose()
}

fn conversion_error<E>(idx: usize, ty: Type, error: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(error))
}

/// Map the leading wish columns of `row`.
pub(crate) fn row_to_wish_row(row: &Row<'_>) -> rusqlite::Result<WishRow> {
    let category: String = row.get(2)?;
    let category = category
        .parse::<Category>()
        .map_err(|e| conversion_error(2, Type::Text, e))?;

    Ok(WishRow {
        id: WishId::new(row.get::<_, String>(0)?),
        group_id: GroupId::new(row.get::<_, String>(1)?),
        category,
        title: row.get(3)?,
        description: row.get(4)?,
        image_url: row.get(5)?,
        source_url: row.get(6)?,
        created_by: UserId::new(row.get::<_, String>(7)?),
        is_done: row.get::<_, i64>(8)? != 0,
        done_at: opt_micros_to_datetime(9, row.get(9)?)?,
        created_at: micros_to_datetime(10, row.get(10)?)?,
    })
}

#[derive(Deserialize)]
struct RawVote {
    user_id: String,
    value: i64,
}

fn parse_votes(idx: usize, json: &str) -> rusqlite::Result<Vec<PriorityVote>> {
    let raw: Vec<RawVote> =
        serde_json::from_str(json).map_err(|e| conversion_error(idx, Type::Text, e))?;
    raw.into_iter()
        .map(|vote| {
            let value = PriorityValue::try_from(vote.value)
                .map_err(|e| conversion_error(idx, Type::Integer, e))?;
            Ok(PriorityVote {
                user_id: UserId::new(vote.user_id),
                value,
            })
        })
        .collect()
}

fn row_to_wish(row: &Row<'_>, join: JoinSpec) -> rusqlite::Result<Wish> {
    let base = WISH_COLUMN_COUNT;
    let wish_row = row_to_wish_row(row)?;

    let creator_id: Option<String> = row.get(base)?;
    let creator_name: Option<String> = row.get(base + 1)?;
    let creator = creator_id.zip(creator_name).map(|(id, display_name)| Creator {
        id: UserId::new(id),
        display_name,
    });

    let comment_count: i64 = row.get(base + 2)?;
    let comment_count = u32::try_from(comment_count)
        .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(base + 2, comment_count))?;

    let priority_votes = match join {
        JoinSpec::Enriched => {
            let json: Option<String> = row.get(base + 3)?;
            json.map_or_else(|| Ok(Vec::new()), |j| parse_votes(base + 3, &j))?
        }
        JoinSpec::Reduced => Vec::new(),
    };

    Ok(Wish {
        row: wish_row,
        creator,
        comment_count,
        priority_votes,
    })
}

pub(crate) fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId::new(row.get::<_, String>(0)?),
        email: row.get(1)?,
        display_name: row.get(2)?,
        avatar_url: row.get(3)?,
        partner_id: row.get::<_, Option<String>>(4)?.map(UserId::new),
        group_id: row.get::<_, Option<String>>(5)?.map(GroupId::new),
        invite_code: row.get(6)?,
        push_token: row.get(7)?,
        created_at: micros_to_datetime(8, row.get(8)?)?,
    })
}

fn row_to_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    let user_id = UserId::new(row.get::<_, String>(2)?);
    let author = row
        .get::<_, Option<String>>(5)?
        .map(|display_name| Creator {
            id: user_id.clone(),
            display_name,
        });
    Ok(Comment {
        id: CommentId::new(row.get::<_, String>(0)?),
        wish_id: WishId::new(row.get::<_, String>(1)?),
        user_id,
        text: row.get(3)?,
        created_at: micros_to_datetime(4, row.get(4)?)?,
        author,
    })
}

// ---------------------------------------------------------------------------
// Wishes
// ---------------------------------------------------------------------------

/// Wishes matching `query`, newest first.
///
/// # Errors
///
/// Fails if the SQL cannot be prepared (for instance, the enriched join on a
/// database without `wish_priorities`) or a row does not map.
pub fn query_wishes(
    conn: &Connection,
    query: &WishQuery,
    join: JoinSpec,
) -> rusqlite::Result<Vec<Wish>> {
    let mut sql = wish_select(join);
    sql.push_str(" WHERE w.group_id = ?1 AND w.is_done = ?2");

    let mut params: Vec<Box<dyn ToSql>> = vec![
        Box::new(query.group_id.as_str().to_string()),
        Box::new(i64::from(query.done)),
    ];
    if let CategoryFilter::Only(category) = query.category {
        sql.push_str(" AND w.category = ?3");
        params.push(Box::new(category.as_str()));
    }
    sql.push_str(" ORDER BY w.created_at_us DESC, w.rowid DESC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), |row| row_to_wish(row, join))?;
    rows.collect()
}

/// One wish with its joined fields.
///
/// # Errors
///
/// Fails if the SQL cannot be prepared or the row does not map.
pub fn wish_by_id(conn: &Connection, id: &WishId, join: JoinSpec) -> rusqlite::Result<Option<Wish>> {
    let sql = format!("{} WHERE w.wish_id = ?1", wish_select(join));
    conn.query_row(&sql, params![id.as_str()], |row| row_to_wish(row, join))
        .optional()
}

/// Scalar row only.
///
/// # Errors
///
/// Fails on SQL error.
pub fn wish_row_by_id(conn: &Connection, id: &WishId) -> rusqlite::Result<Option<WishRow>> {
    let sql = format!("SELECT {WISH_COLUMNS} FROM wishes w WHERE w.wish_id = ?1");
    conn.query_row(&sql, params![id.as_str()], row_to_wish_row)
        .optional()
}

/// Current votes on a wish, oldest first.
///
/// # Errors
///
/// Fails if `wish_priorities` is missing or a value is out of range.
pub fn votes_for(conn: &Connection, id: &WishId) -> rusqlite::Result<Vec<PriorityVote>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, value FROM wish_priorities
         WHERE wish_id = ?1 ORDER BY created_at_us, user_id",
    )?;
    let rows = stmt.query_map(params![id.as_str()], |row| {
        let raw: i64 = row.get(1)?;
        let value = PriorityValue::try_from(raw).map_err(|e| conversion_error(1, Type::Integer, e))?;
        Ok(PriorityVote {
            user_id: UserId::new(row.get::<_, String>(0)?),
            value,
        })
    })?;
    rows.collect()
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

/// Comments on a wish, oldest first, authors joined.
///
/// # Errors
///
/// Fails on SQL error.
pub fn comments_for(conn: &Connection, wish_id: &WishId) -> rusqlite::Result<Vec<Comment>> {
    let sql = format!("{COMMENT_SELECT} WHERE c.wish_id = ?1 ORDER BY c.created_at_us ASC, c.rowid ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![wish_id.as_str()], row_to_comment)?;
    rows.collect()
}

/// # Errors
///
/// Fails on SQL error.
pub fn comment_by_id(conn: &Connection, id: &CommentId) -> rusqlite::Result<Option<Comment>> {
    let sql = format!("{COMMENT_SELECT} WHERE c.comment_id = ?1");
    conn.query_row(&sql, params![id.as_str()], row_to_comment)
        .optional()
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Which unique user column to look up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserKey {
    Id,
    Email,
    InviteCode,
}

impl UserKey {
    const fn column(self) -> &'static str {
        match self {
            Self::Id => "user_id",
            Self::Email => "email",
            Self::InviteCode => "invite_code",
        }
    }
}

/// # Errors
///
/// Fails on SQL error.
pub fn user_by(conn: &Connection, key: UserKey, value: &str) -> rusqlite::Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {} = ?1", key.column());
    conn.query_row(&sql, params![value], row_to_user).optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations;

    fn test_db() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open in-memory db");
        migrations::migrate(&mut conn).expect("migrate");
        conn.execute_batch(
            "INSERT INTO users (user_id, email, display_name, created_at_us)
                 VALUES ('ua', 'a@example.com', 'Ana', 1), ('ub', 'b@example.com', 'Ben', 1);
             INSERT INTO wishes (wish_id, group_id, category, title, created_by, created_at_us)
                 VALUES ('w1', 'g', 'movies', 'Dune', 'ua', 10),
                        ('w2', 'g', 'places', 'Lisbon', 'ub', 20),
                        ('w3', 'other', 'movies', 'Heat', 'ua', 30);
             INSERT INTO wishes (wish_id, group_id, category, title, created_by, is_done,
                                 done_at_us, created_at_us)
                 VALUES ('w4', 'g', 'movies', 'Alien', 'ua', 1, 50, 40);
             INSERT INTO comments (comment_id, wish_id, user_id, text, created_at_us)
                 VALUES ('c1', 'w1', 'ub', 'yes!', 11), ('c2', 'w1', 'ua', 'tonight?', 12);
             INSERT INTO wish_priorities (wish_id, user_id, value, created_at_us)
                 VALUES ('w1', 'ua', 3, 13), ('w1', 'ub', 5, 14);",
        )
        .expect("seed");
        conn
    }

    fn query(category: CategoryFilter, done: bool) -> WishQuery {
        WishQuery {
            group_id: GroupId::from("g"),
            category,
            done,
        }
    }

    #[test]
    fn enriched_query_joins_everything() {
        let conn = test_db();
        let wishes =
            query_wishes(&conn, &query(CategoryFilter::All, false), JoinSpec::Enriched).expect("query");
        let ids: Vec<_> = wishes.iter().map(|w| w.id().as_str()).collect();
        assert_eq!(ids, ["w2", "w1"]);

        let dune = &wishes[1];
        assert_eq!(dune.comment_count, 2);
        assert_eq!(dune.creator.as_ref().map(|c| c.display_name.as_str()), Some("Ana"));
        assert_eq!(dune.priority_votes.len(), 2);
        assert_eq!(dune.average_priority(), Some(4.0));
        assert!(wishes[0].priority_votes.is_empty());
    }

    #[test]
    fn reduced_query_omits_votes() {
        let conn = test_db();
        let wishes =
            query_wishes(&conn, &query(CategoryFilter::All, false), JoinSpec::Reduced).expect("query");
        assert_eq!(wishes.len(), 2);
        assert!(wishes.iter().all(|w| w.priority_votes.is_empty()));
        assert_eq!(wishes[1].comment_count, 2);
    }

    #[test]
    fn category_and_done_filters_apply() {
        let conn = test_db();
        let movies = query_wishes(
            &conn,
            &query(CategoryFilter::Only(Category::Movies), false),
            JoinSpec::Enriched,
        )
        .expect("query");
        assert_eq!(movies.len(), 1);

        let done = query_wishes(&conn, &query(CategoryFilter::All, true), JoinSpec::Enriched)
            .expect("query");
        assert_eq!(done.len(), 1);
        assert!(done[0].row.is_done);
        assert!(done[0].row.done_at.is_some());
    }

    #[test]
    fn enriched_query_fails_without_priorities_table() {
        let mut conn = Connection::open_in_memory().expect("open");
        migrations::migrate_to(&mut conn, 1).expect("migrate v1");
        let enriched = query_wishes(&conn, &query(CategoryFilter::All, false), JoinSpec::Enriched);
        assert!(enriched.is_err());
        let reduced = query_wishes(&conn, &query(CategoryFilter::All, false), JoinSpec::Reduced);
        assert!(reduced.expect("reduced works on v1").is_empty());
    }

    #[test]
    fn missing_wish_is_none() {
        let conn = test_db();
        assert!(
            wish_by_id(&conn, &WishId::from("nope"), JoinSpec::Enriched)
                .expect("query")
                .is_none()
        );
        assert!(
            wish_row_by_id(&conn, &WishId::from("w2"))
                .expect("query")
                .is_some()
        );
    }

    #[test]
    fn comments_are_ascending_with_authors() {
        let conn = test_db();
        let comments = comments_for(&conn, &WishId::from("w1")).expect("comments");
        let texts: Vec<_> = comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["yes!", "tonight?"]);
        assert_eq!(
            comments[0].author.as_ref().map(|a| a.display_name.as_str()),
            Some("Ben")
        );
    }

    #[test]
    fn user_lookup_by_each_key() {
        let conn = test_db();
        conn.execute("UPDATE users SET invite_code = 'ABC123' WHERE user_id = 'ub'", [])
            .expect("set code");
        let by_email = user_by(&conn, UserKey::Email, "a@example.com").expect("query");
        assert_eq!(by_email.map(|u| u.id), Some(UserId::from("ua")));
        let by_code = user_by(&conn, UserKey::InviteCode, "ABC123").expect("query");
        assert_eq!(by_code.map(|u| u.display_name), Some("Ben".to_string()));
        assert!(user_by(&conn, UserKey::Id, "zz").expect("query").is_none());
    }
}
