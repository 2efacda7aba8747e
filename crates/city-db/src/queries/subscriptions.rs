use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use city_types::models::{Subscription, SubscriptionStatus};

use super::OptionalExt;
use crate::models::SubscriptionRow;
use crate::to_millis;

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, tier, status, current_period_start, \
     current_period_end, features, monthly_revenue, stripe_customer_id, stripe_subscription_id, \
     created_at, canceled_at";

pub fn insert_subscription(conn: &Connection, sub: &Subscription) -> Result<()> {
    conn.execute(
        "INSERT INTO subscriptions (id, user_id, tier, status, current_period_start,
                                    current_period_end, features, monthly_revenue,
                                    stripe_customer_id, stripe_subscription_id, created_at, canceled_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            sub.id.to_string(),
            sub.user_id.to_string(),
            sub.tier.as_str(),
            sub.status.as_str(),
            to_millis(sub.current_period_start),
            to_millis(sub.current_period_end),
            serde_json::to_string(&sub.features)?,
            sub.monthly_revenue,
            sub.stripe_customer_id,
            sub.stripe_subscription_id,
            to_millis(sub.created_at),
            sub.canceled_at.map(to_millis),
        ],
    )?;
    Ok(())
}

pub fn get_subscription(conn: &Connection, id: Uuid) -> Result<Option<Subscription>> {
    let row = conn
        .query_row(
            &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ?1"),
            [id.to_string()],
            map_subscription_row,
        )
        .optional()?;
    row.map(Subscription::try_from).transpose()
}

pub fn list_for_user(conn: &Connection, user_id: Uuid) -> Result<Vec<Subscription>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = ?1 ORDER BY created_at, id"
    ))?;
    let rows = stmt
        .query_map([user_id.to_string()], map_subscription_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(Subscription::try_from).collect()
}

pub fn cancel(conn: &Connection, id: Uuid, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE subscriptions SET status = ?2, canceled_at = ?3 WHERE id = ?1",
        params![
            id.to_string(),
            SubscriptionStatus::Canceled.as_str(),
            to_millis(now)
        ],
    )?;
    Ok(())
}

/// Cancel every active subscription of a user. Returns how many changed.
pub fn cancel_all_active(conn: &Connection, user_id: Uuid, now: DateTime<Utc>) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE subscriptions SET status = ?2, canceled_at = ?3 WHERE user_id = ?1 AND status = ?4",
        params![
            user_id.to_string(),
            SubscriptionStatus::Canceled.as_str(),
            to_millis(now),
            SubscriptionStatus::Active.as_str(),
        ],
    )?;
    Ok(changed)
}

fn map_subscription_row(row: &Row<'_>) -> rusqlite::Result<SubscriptionRow> {
    Ok(SubscriptionRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        tier: row.get(2)?,
        status: row.get(3)?,
        current_period_start: row.get(4)?,
        current_period_end: row.get(5)?,
        features: row.get(6)?,
        monthly_revenue: row.get(7)?,
        stripe_customer_id: row.get(8)?,
        stripe_subscription_id: row.get(9)?,
        created_at: row.get(10)?,
        canceled_at: row.get(11)?,
    })
}
