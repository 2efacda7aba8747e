use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tiers::{Features, Limit, TierId};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotSize {
    pub width: i64,
    pub depth: i64,
}

impl PlotSize {
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.depth > 0
    }

    /// Area in squares. Only meaningful for a valid size.
    pub fn area(&self) -> u64 {
        (self.width.max(0) as u64).saturating_mul(self.depth.max(0) as u64)
    }

    /// Area of a valid size whose `width * depth` fits the stored integer
    /// column; `None` otherwise.
    pub fn checked_area(&self) -> Option<u64> {
        if !self.is_valid() {
            return None;
        }
        self.width.checked_mul(self.depth).map(|a| a as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    pub style: String,
    pub color: String,
    pub floors: u32,
}

/// Advertising attached to a plot. `logo` holds an inline data URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub company_name: String,
    pub website: Option<String>,
    pub logo: Option<String>,
    pub description: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    pub address: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plot {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub position: Position,
    pub size: PlotSize,
    pub building: Option<Building>,
    pub company_info: Option<CompanyInfo>,
    pub mailbox: Option<Mailbox>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plot {
    /// The mailbox, if one is configured and switched on.
    pub fn enabled_mailbox(&self) -> Option<&Mailbox> {
        self.mailbox.as_ref().filter(|m| m.enabled)
    }
}

pub const DEFAULT_MESSAGE_TYPE: &str = "user_message";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub id: Uuid,
    pub plot_id: Uuid,
    /// `None` for anonymous and system senders.
    pub sender_id: Option<Uuid>,
    pub sender_name: String,
    /// Copied from the plot at send time; not updated if the plot later
    /// changes its address.
    pub recipient_address: String,
    pub subject: String,
    pub body: String,
    pub message_type: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tier: TierId,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    /// Frozen at creation; later tier table changes do not apply.
    pub features: Features,
    pub monthly_revenue: i64,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
}

/// Account fields other components care about. The password hash never
/// leaves the database crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub subscription_tier: Option<TierId>,
    pub current_subscription_id: Option<Uuid>,
    pub ai_credits_used: u64,
    pub ai_credits_limit: Limit,
    pub free_squares_limit: Limit,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiInteraction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plot_id: Option<Uuid>,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}
