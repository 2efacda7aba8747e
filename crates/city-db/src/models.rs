//! Database row types. These map directly to SQLite rows and are converted
//! into `city-types` models once JSON columns and ids have been decoded.

use anyhow::{Context, Result};
use uuid::Uuid;

use city_types::models::{
    MailMessage, Mailbox, Plot, PlotSize, Position, Subscription, SubscriptionStatus, User,
};
use city_types::tiers::{Limit, TierId};

use crate::from_millis;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub subscription_tier: Option<String>,
    pub current_subscription_id: Option<String>,
    pub ai_credits_used: i64,
    pub ai_credits_limit: i64,
    pub free_squares_limit: i64,
    pub created_at: i64,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: parse_id(&row.id)?,
            subscription_tier: row
                .subscription_tier
                .as_deref()
                .map(str::parse::<TierId>)
                .transpose()?,
            current_subscription_id: row.current_subscription_id.as_deref().map(parse_id).transpose()?,
            ai_credits_used: row.ai_credits_used.max(0) as u64,
            ai_credits_limit: parse_limit(row.ai_credits_limit)?,
            free_squares_limit: parse_limit(row.free_squares_limit)?,
            created_at: from_millis(row.created_at)?,
            username: row.username,
            email: row.email,
            nickname: row.nickname,
        })
    }
}

pub struct PlotRow {
    pub id: String,
    pub owner_id: String,
    pub position_x: f64,
    pub position_z: f64,
    pub width: i64,
    pub depth: i64,
    pub building: Option<String>,
    pub company_info: Option<String>,
    pub mailbox_address: Option<String>,
    pub mailbox_enabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<PlotRow> for Plot {
    type Error = anyhow::Error;

    fn try_from(row: PlotRow) -> Result<Self> {
        let building = row
            .building
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .with_context(|| format!("Corrupt building on plot {}", row.id))?;
        let company_info = row
            .company_info
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .with_context(|| format!("Corrupt company_info on plot {}", row.id))?;

        Ok(Plot {
            id: parse_id(&row.id)?,
            owner_id: parse_id(&row.owner_id)?,
            position: Position {
                x: row.position_x,
                z: row.position_z,
            },
            size: PlotSize {
                width: row.width,
                depth: row.depth,
            },
            building,
            company_info,
            mailbox: row.mailbox_address.map(|address| Mailbox {
                address,
                enabled: row.mailbox_enabled,
            }),
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

pub struct MailRow {
    pub id: String,
    pub plot_id: String,
    pub sender_id: Option<String>,
    pub sender_name: String,
    pub recipient_address: String,
    pub subject: String,
    pub body: String,
    pub message_type: String,
    pub timestamp: i64,
    pub is_read: bool,
}

impl TryFrom<MailRow> for MailMessage {
    type Error = anyhow::Error;

    fn try_from(row: MailRow) -> Result<Self> {
        Ok(MailMessage {
            id: parse_id(&row.id)?,
            plot_id: parse_id(&row.plot_id)?,
            sender_id: row.sender_id.as_deref().map(parse_id).transpose()?,
            sender_name: row.sender_name,
            recipient_address: row.recipient_address,
            subject: row.subject,
            body: row.body,
            message_type: row.message_type,
            timestamp: from_millis(row.timestamp)?,
            is_read: row.is_read,
        })
    }
}

pub struct SubscriptionRow {
    pub id: String,
    pub user_id: String,
    pub tier: String,
    pub status: String,
    pub current_period_start: i64,
    pub current_period_end: i64,
    pub features: String,
    pub monthly_revenue: i64,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub created_at: i64,
    pub canceled_at: Option<i64>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = anyhow::Error;

    fn try_from(row: SubscriptionRow) -> Result<Self> {
        let status = match row.status.as_str() {
            "active" => SubscriptionStatus::Active,
            "canceled" => SubscriptionStatus::Canceled,
            other => anyhow::bail!("Unknown subscription status '{}' on {}", other, row.id),
        };

        Ok(Subscription {
            id: parse_id(&row.id)?,
            user_id: parse_id(&row.user_id)?,
            tier: row.tier.parse()?,
            status,
            current_period_start: from_millis(row.current_period_start)?,
            current_period_end: from_millis(row.current_period_end)?,
            features: serde_json::from_str(&row.features)
                .with_context(|| format!("Corrupt features on subscription {}", row.id))?,
            monthly_revenue: row.monthly_revenue,
            stripe_customer_id: row.stripe_customer_id,
            stripe_subscription_id: row.stripe_subscription_id,
            created_at: from_millis(row.created_at)?,
            canceled_at: row.canceled_at.map(from_millis).transpose()?,
        })
    }
}

fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("Corrupt id '{}'", raw))
}

fn parse_limit(raw: i64) -> Result<Limit> {
    Limit::try_from(raw).map_err(anyhow::Error::msg)
}
