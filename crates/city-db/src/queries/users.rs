use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use city_types::models::User;
use city_types::tiers::{FREE_AI_CREDITS, FREE_SQUARES, Limit, TierId};

use super::OptionalExt;
use crate::models::UserRow;
use crate::to_millis;

const USER_COLUMNS: &str = "id, username, password, email, nickname, subscription_tier, \
     current_subscription_id, ai_credits_used, ai_credits_limit, free_squares_limit, created_at";

pub fn insert_user(
    conn: &Connection,
    id: Uuid,
    username: &str,
    password_hash: &str,
    email: Option<&str>,
    nickname: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, username, password, email, nickname, ai_credits_limit, free_squares_limit, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id.to_string(),
            username,
            password_hash,
            email,
            nickname,
            FREE_AI_CREDITS.as_i64(),
            FREE_SQUARES.as_i64(),
            to_millis(now),
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            [id.to_string()],
            map_user_row,
        )
        .optional()?;
    row.map(User::try_from).transpose()
}

/// Login lookup. Returns the raw row because it carries the password hash.
pub fn get_user_row_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
        [username],
        map_user_row,
    )
    .optional()
}

/// Point the user at a subscription (or at none) and copy the tier limits
/// onto the account.
pub fn set_subscription(
    conn: &Connection,
    user_id: Uuid,
    tier: Option<TierId>,
    subscription_id: Option<Uuid>,
    ai_credits_limit: Limit,
    free_squares_limit: Limit,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE users
         SET subscription_tier = ?2, current_subscription_id = ?3,
             ai_credits_limit = ?4, free_squares_limit = ?5
         WHERE id = ?1",
        params![
            user_id.to_string(),
            tier.map(TierId::as_str),
            subscription_id.map(|id| id.to_string()),
            ai_credits_limit.as_i64(),
            free_squares_limit.as_i64(),
        ],
    )?;
    Ok(changed == 1)
}

pub fn increment_ai_credits_used(conn: &Connection, user_id: Uuid) -> Result<()> {
    conn.execute(
        "UPDATE users SET ai_credits_used = ai_credits_used + 1 WHERE id = ?1",
        [user_id.to_string()],
    )?;
    Ok(())
}

fn map_user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        email: row.get(3)?,
        nickname: row.get(4)?,
        subscription_tier: row.get(5)?,
        current_subscription_id: row.get(6)?,
        ai_credits_used: row.get(7)?,
        ai_credits_limit: row.get(8)?,
        free_squares_limit: row.get(9)?,
        created_at: row.get(10)?,
    })
}
