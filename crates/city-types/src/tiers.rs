//! The one tier table. Both the public tier listing and subscription creation
//! read from here, so prices and limits can never drift apart.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// AI credits granted to users without a subscription.
pub const FREE_AI_CREDITS: Limit = Limit::Limited(100);

/// Plot area (in squares) granted to users without a subscription.
pub const FREE_SQUARES: Limit = Limit::Limited(25);

/// Mailbox-bearing plots allowed without a subscription.
pub const FREE_MAILBOXES: Limit = Limit::Limited(1);

/// Length of a subscription period. Periods are never renewed automatically.
pub const PERIOD_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierId {
    Startup,
    Business,
    Corporate,
    Enterprise,
}

impl TierId {
    pub const ALL: [TierId; 4] = [
        TierId::Startup,
        TierId::Business,
        TierId::Corporate,
        TierId::Enterprise,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TierId::Startup => "startup",
            TierId::Business => "business",
            TierId::Corporate => "corporate",
            TierId::Enterprise => "enterprise",
        }
    }

    pub fn definition(self) -> &'static TierDefinition {
        match self {
            TierId::Startup => &TIERS[0],
            TierId::Business => &TIERS[1],
            TierId::Corporate => &TIERS[2],
            TierId::Enterprise => &TIERS[3],
        }
    }

    /// Feature flags unlocked by this tier. Subscriptions copy these at
    /// creation time and never recompute them.
    pub fn features(self) -> Features {
        let rank = self as u8;
        Features {
            business_intelligence: rank >= TierId::Business as u8,
            priority_support: rank >= TierId::Business as u8,
            api_access: rank >= TierId::Corporate as u8,
            virtual_events: rank >= TierId::Corporate as u8,
            custom_ai: self == TierId::Enterprise,
        }
    }

    /// Informational revenue figure in minor currency units.
    pub fn monthly_revenue(self) -> i64 {
        i64::from(self.definition().price_usd) * 100
    }
}

impl fmt::Display for TierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown subscription tier '{0}'")]
pub struct UnknownTier(pub String);

impl FromStr for TierId {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "startup" => Ok(TierId::Startup),
            "business" => Ok(TierId::Business),
            "corporate" => Ok(TierId::Corporate),
            "enterprise" => Ok(TierId::Enterprise),
            _ => Err(UnknownTier(s.to_string())),
        }
    }
}

/// A resource allowance. On the wire `-1` means unlimited, matching what
/// clients already send and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Limit {
    Limited(u64),
    Unlimited,
}

impl Limit {
    /// Whether a total usage of `amount` fits inside the allowance.
    pub fn allows(self, amount: u64) -> bool {
        match self {
            Limit::Limited(max) => amount <= max,
            Limit::Unlimited => true,
        }
    }

    pub fn as_i64(self) -> i64 {
        i64::from(self)
    }
}

impl From<Limit> for i64 {
    fn from(limit: Limit) -> i64 {
        match limit {
            Limit::Limited(max) => i64::try_from(max).unwrap_or(i64::MAX),
            Limit::Unlimited => -1,
        }
    }
}

impl TryFrom<i64> for Limit {
    type Error = String;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            -1 => Ok(Limit::Unlimited),
            n if n >= 0 => Ok(Limit::Limited(n as u64)),
            n => Err(format!("invalid limit {n}: expected -1 or a non-negative count")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    pub business_intelligence: bool,
    pub priority_support: bool,
    pub api_access: bool,
    pub virtual_events: bool,
    pub custom_ai: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TierDefinition {
    pub id: TierId,
    pub name: &'static str,
    pub description: &'static str,
    pub price_usd: u32,
    /// Total plot area, in squares, a subscriber may own.
    pub plot_squares: Limit,
    pub ai_credits: Limit,
    pub custom_models: Limit,
    pub mailboxes: Limit,
    pub highlights: &'static [&'static str],
}

pub static TIERS: [TierDefinition; 4] = [
    TierDefinition {
        id: TierId::Startup,
        name: "Startup",
        description: "A storefront for a small team getting started in the city",
        price_usd: 29,
        plot_squares: Limit::Limited(100),
        ai_credits: Limit::Limited(1000),
        custom_models: Limit::Limited(1),
        mailboxes: Limit::Limited(1),
        highlights: &["Company logo on your building", "One public mailbox"],
    },
    TierDefinition {
        id: TierId::Business,
        name: "Business",
        description: "Room to grow with analytics and faster support",
        price_usd: 99,
        plot_squares: Limit::Limited(400),
        ai_credits: Limit::Limited(5000),
        custom_models: Limit::Limited(5),
        mailboxes: Limit::Limited(5),
        highlights: &["Business intelligence", "Priority support"],
    },
    TierDefinition {
        id: TierId::Corporate,
        name: "Corporate",
        description: "A campus with API access and virtual events",
        price_usd: 299,
        plot_squares: Limit::Limited(1600),
        ai_credits: Limit::Limited(20000),
        custom_models: Limit::Limited(25),
        mailboxes: Limit::Limited(25),
        highlights: &["API access", "Virtual events"],
    },
    TierDefinition {
        id: TierId::Enterprise,
        name: "Enterprise",
        description: "No limits, plus a custom AI assistant for your district",
        price_usd: 999,
        plot_squares: Limit::Unlimited,
        ai_credits: Limit::Unlimited,
        custom_models: Limit::Unlimited,
        mailboxes: Limit::Unlimited,
        highlights: &["Unlimited everything", "Custom AI"],
    },
];

/// Mailbox allowance for a user on `tier` (or on the free plan when `None`).
pub fn mailbox_limit(tier: Option<TierId>) -> Limit {
    tier.map(|t| t.definition().mailboxes).unwrap_or(FREE_MAILBOXES)
}
