//! Per-plot mailboxes: anyone can send, only the plot owner can read,
//! mark or delete.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use city_db::queries::mail::{self as mail_store, MailKey};
use city_db::queries::plots;
use city_db::{Connection, Database};
use city_types::api::{Claims, MailPage, MailQuery, SendMailRequest, UnreadCount};
use city_types::models::{DEFAULT_MESSAGE_TYPE, MailMessage};

use crate::error::ApiError;
use crate::plots::require_owned_plot;

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Display name for a message sender: an explicit override wins, then the
/// caller's username, nickname or email. Signed-in callers without any of
/// those are "Authenticated User"; anonymous callers are "System".
pub fn resolve_sender_name(explicit: Option<&str>, caller: Option<&Claims>) -> String {
    if let Some(name) = explicit.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    match caller {
        Some(claims) => [
            Some(claims.username.as_str()),
            claims.nickname.as_deref(),
            claims.email.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|n| !n.is_empty())
        .unwrap_or("Authenticated User")
        .to_string(),
        None => "System".to_string(),
    }
}

pub fn send_message(
    db: &Database,
    caller: Option<&Claims>,
    req: SendMailRequest,
) -> Result<MailMessage, ApiError> {
    let address = req.recipient_address.trim().to_ascii_lowercase();
    let sender_name = resolve_sender_name(req.sender_name.as_deref(), caller);
    let message_type = req
        .message_type
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_MESSAGE_TYPE.to_string());

    let message = db.with_tx(|tx| {
        let plot = plots::find_by_mailbox_address(tx, &address)?
            .ok_or(ApiError::NotFound("mailbox"))?;
        let mailbox = plot.enabled_mailbox().ok_or(ApiError::MailboxDisabled)?;

        let message = MailMessage {
            id: Uuid::new_v4(),
            plot_id: plot.id,
            sender_id: caller.map(|c| c.sub),
            sender_name,
            recipient_address: mailbox.address.clone(),
            subject: req.subject,
            body: req.body,
            message_type,
            timestamp: Utc::now(),
            is_read: false,
        };
        mail_store::insert_message(tx, &message)?;
        Ok::<_, ApiError>(message)
    })?;

    info!(
        "Mail {} delivered to '{}' from {}",
        message.id, message.recipient_address, message.sender_name
    );
    Ok(message)
}

/// Marking an already-read message again is a no-op, not an error.
pub fn mark_message_as_read(
    db: &Database,
    user_id: Uuid,
    message_id: Uuid,
) -> Result<MailMessage, ApiError> {
    db.with_tx(|tx| {
        let message = require_owned_message(tx, user_id, message_id)?;
        if !message.is_read {
            mail_store::mark_read(tx, message_id)?;
        }
        Ok(MailMessage {
            is_read: true,
            ..message
        })
    })
}

pub fn delete_message(db: &Database, user_id: Uuid, message_id: Uuid) -> Result<(), ApiError> {
    db.with_tx(|tx| {
        require_owned_message(tx, user_id, message_id)?;
        mail_store::delete_message(tx, message_id)?;
        Ok::<_, ApiError>(())
    })?;
    debug!("Mail {} deleted by {}", message_id, user_id);
    Ok(())
}

/// One page of a plot's mail, newest first. `max_limit` caps the page size.
pub fn get_messages_for_plot(
    db: &Database,
    user_id: Uuid,
    plot_id: Uuid,
    query: MailQuery,
    max_limit: u32,
) -> Result<MailPage, ApiError> {
    let after = query.cursor.as_deref().map(decode_cursor).transpose()?;
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, max_limit.max(1));

    db.with_conn(|conn| {
        let plot = require_owned_plot(conn, user_id, plot_id)?;
        if plot.enabled_mailbox().is_none() {
            return Err(ApiError::MailboxDisabled);
        }

        // One extra row tells us whether another page exists.
        let mut page = mail_store::page_messages(conn, plot_id, after.as_ref(), limit.saturating_add(1))?;
        let is_done = page.len() <= limit as usize;
        page.truncate(limit as usize);
        let continue_cursor = if is_done {
            None
        } else {
            page.last().map(|m| encode_cursor(&MailKey::of(m)))
        };

        Ok(MailPage {
            page,
            is_done,
            continue_cursor,
        })
    })
}

/// Unread count; a plot without an enabled mailbox simply has none.
pub fn get_unread_message_count(
    db: &Database,
    user_id: Uuid,
    plot_id: Uuid,
) -> Result<UnreadCount, ApiError> {
    db.with_conn(|conn| {
        let plot = require_owned_plot(conn, user_id, plot_id)?;
        let count = match plot.enabled_mailbox() {
            Some(_) => mail_store::count_unread(conn, plot_id)?,
            None => 0,
        };
        Ok(UnreadCount { count })
    })
}

fn require_owned_message(
    conn: &Connection,
    user_id: Uuid,
    message_id: Uuid,
) -> Result<MailMessage, ApiError> {
    let message = mail_store::get_message(conn, message_id)?.ok_or(ApiError::NotFound("message"))?;
    require_owned_plot(conn, user_id, message.plot_id)?;
    Ok(message)
}

pub fn encode_cursor(key: &MailKey) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}:{}", key.timestamp_ms, key.id))
}

pub fn decode_cursor(cursor: &str) -> Result<MailKey, ApiError> {
    let invalid = || ApiError::invalid("malformed cursor");
    let raw = URL_SAFE_NO_PAD.decode(cursor).map_err(|_| invalid())?;
    let raw = String::from_utf8(raw).map_err(|_| invalid())?;
    let (ts, id) = raw.split_once(':').ok_or_else(invalid)?;
    let timestamp_ms = ts.parse::<i64>().map_err(|_| invalid())?;
    let id = id.parse::<Uuid>().map_err(|_| invalid())?;
    Ok(MailKey {
        timestamp_ms,
        id: id.to_string(),
    })
}
