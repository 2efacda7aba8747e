use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Building, CompanyInfo, MailMessage, Mailbox, PlotSize, Position};
use crate::tiers::{Limit, TierId};

// -- JWT Claims --

/// Identity carried by every bearer token. Email and nickname feed the
/// sender-name fallback chain for mail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub nickname: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Plots --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePlotRequest {
    pub position: Position,
    pub size: PlotSize,
    pub building: Option<Building>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateBuildingRequest {
    pub building: Option<Building>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigureMailboxRequest {
    /// Omit to keep the current address.
    pub address: Option<String>,
    pub enabled: bool,
}

/// What anyone may see about a plot: the owner appears by username only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicPlot {
    pub id: Uuid,
    pub owner_username: String,
    pub position: Position,
    pub size: PlotSize,
    pub building: Option<Building>,
    pub company_info: Option<CompanyInfo>,
    pub mailbox: Option<Mailbox>,
    pub updated_at: DateTime<Utc>,
}

// -- Company info --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadLogoRequest {
    pub logo_svg: String,
    pub company_name: String,
}

/// Full replacement: every field must be present.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateCompanyInfoRequest {
    pub company_name: String,
    pub website: String,
    pub logo: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyPlot {
    pub plot_id: Uuid,
    pub owner_username: String,
    pub position: Position,
    pub size: PlotSize,
    pub company_info: CompanyInfo,
}

#[derive(Debug, Deserialize)]
pub struct CompanySearchQuery {
    /// Optional at the extractor so a missing parameter gets a JSON error.
    pub company_name: Option<String>,
}

/// Company fields of a single plot; all absent when nothing is attached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotCompanyInfo {
    pub company_name: Option<String>,
    pub website: Option<String>,
    pub logo: Option<String>,
    pub description: Option<String>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl From<Option<CompanyInfo>> for PlotCompanyInfo {
    fn from(info: Option<CompanyInfo>) -> Self {
        match info {
            Some(info) => Self {
                company_name: Some(info.company_name),
                website: info.website,
                logo: info.logo,
                description: info.description,
                uploaded_at: Some(info.uploaded_at),
            },
            None => Self::default(),
        }
    }
}

// -- Mail --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMailRequest {
    pub recipient_address: String,
    pub subject: String,
    pub body: String,
    pub sender_name: Option<String>,
    pub message_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MailQuery {
    /// Opaque cursor from the previous page's `continue_cursor`.
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailPage {
    pub page: Vec<MailMessage>,
    pub is_done: bool,
    pub continue_cursor: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UnreadCount {
    pub count: u64,
}

// -- Subscriptions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSubscriptionRequest {
    /// Kept as a raw string: unknown tiers are handled by policy rather
    /// than rejected during deserialization.
    pub tier: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStats {
    pub tier: Option<TierId>,
    pub plot_count: u64,
    pub total_area: u64,
    pub space_limit: Limit,
    pub ai_credits_used: u64,
    pub ai_credits_limit: Limit,
    pub ai_interactions_this_month: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordAiInteractionRequest {
    pub plot_id: Option<Uuid>,
    pub kind: Option<String>,
}
