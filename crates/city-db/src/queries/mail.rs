use anyhow::Result;
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use city_types::models::MailMessage;

use super::OptionalExt;
use crate::models::MailRow;
use crate::to_millis;

const MAIL_COLUMNS: &str = "id, plot_id, sender_id, sender_name, recipient_address, subject, body, \
     message_type, timestamp, is_read";

/// Position of a message in the `(timestamp DESC, id DESC)` ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailKey {
    pub timestamp_ms: i64,
    pub id: String,
}

impl MailKey {
    pub fn of(message: &MailMessage) -> Self {
        Self {
            timestamp_ms: to_millis(message.timestamp),
            id: message.id.to_string(),
        }
    }
}

pub fn insert_message(conn: &Connection, message: &MailMessage) -> Result<()> {
    conn.execute(
        "INSERT INTO mail_messages (id, plot_id, sender_id, sender_name, recipient_address,
                                    subject, body, message_type, timestamp, is_read)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            message.id.to_string(),
            message.plot_id.to_string(),
            message.sender_id.map(|id| id.to_string()),
            message.sender_name,
            message.recipient_address,
            message.subject,
            message.body,
            message.message_type,
            to_millis(message.timestamp),
            message.is_read,
        ],
    )?;
    Ok(())
}

pub fn get_message(conn: &Connection, id: Uuid) -> Result<Option<MailMessage>> {
    let row = conn
        .query_row(
            &format!("SELECT {MAIL_COLUMNS} FROM mail_messages WHERE id = ?1"),
            [id.to_string()],
            map_mail_row,
        )
        .optional()?;
    row.map(MailMessage::try_from).transpose()
}

pub fn mark_read(conn: &Connection, id: Uuid) -> Result<()> {
    conn.execute(
        "UPDATE mail_messages SET is_read = 1 WHERE id = ?1",
        [id.to_string()],
    )?;
    Ok(())
}

pub fn delete_message(conn: &Connection, id: Uuid) -> Result<bool> {
    let removed = conn.execute("DELETE FROM mail_messages WHERE id = ?1", [id.to_string()])?;
    Ok(removed == 1)
}

/// Up to `limit` messages of a plot, newest first, strictly after `after`
/// in that ordering. Walks the `by_plot_id_timestamp` index, so pages stay
/// stable while new mail arrives.
pub fn page_messages(
    conn: &Connection,
    plot_id: Uuid,
    after: Option<&MailKey>,
    limit: u32,
) -> Result<Vec<MailMessage>> {
    let plot_id = plot_id.to_string();
    let rows = match after {
        Some(key) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MAIL_COLUMNS} FROM mail_messages
                 WHERE plot_id = ?1 AND (timestamp < ?2 OR (timestamp = ?2 AND id < ?3))
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?4"
            ))?;
            stmt.query_map(params![plot_id, key.timestamp_ms, key.id, limit], map_mail_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MAIL_COLUMNS} FROM mail_messages
                 WHERE plot_id = ?1
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?2"
            ))?;
            stmt.query_map(params![plot_id, limit], map_mail_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };
    rows.into_iter().map(MailMessage::try_from).collect()
}

pub fn count_unread(conn: &Connection, plot_id: Uuid) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM mail_messages WHERE plot_id = ?1 AND is_read = 0",
        [plot_id.to_string()],
        |r| r.get(0),
    )?;
    Ok(count.max(0) as u64)
}

fn map_mail_row(row: &Row<'_>) -> rusqlite::Result<MailRow> {
    Ok(MailRow {
        id: row.get(0)?,
        plot_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get(3)?,
        recipient_address: row.get(4)?,
        subject: row.get(5)?,
        body: row.get(6)?,
        message_type: row.get(7)?,
        timestamp: row.get(8)?,
        is_read: row.get(9)?,
    })
}
