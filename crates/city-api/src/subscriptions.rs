//! Subscription tiers, entitlements and usage accounting.

use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Local, TimeZone, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use city_db::Database;
use city_db::queries::{ai, plots, subscriptions, users};
use city_types::api::{CreateSubscriptionRequest, RecordAiInteractionRequest, UsageStats};
use city_types::models::{AiInteraction, Subscription, SubscriptionStatus};
use city_types::tiers::{FREE_AI_CREDITS, FREE_SQUARES, PERIOD_DAYS, TIERS, TierDefinition, TierId};

use crate::error::ApiError;
use crate::plots::require_owned_plot;

/// What to do with a tier name that is not in the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvalidTierPolicy {
    /// Treat it as `startup` and log a warning.
    #[default]
    Fallback,
    /// Fail with `InvalidInput`.
    Reject,
}

impl FromStr for InvalidTierPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fallback" => Ok(Self::Fallback),
            "reject" => Ok(Self::Reject),
            other => Err(format!("expected 'fallback' or 'reject', got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SubscriptionPolicy {
    pub invalid_tier: InvalidTierPolicy,
    /// Cancel the user's active subscriptions before creating a new one, so
    /// a user never holds two live rows.
    pub cancel_prior: bool,
}

impl Default for SubscriptionPolicy {
    fn default() -> Self {
        Self {
            invalid_tier: InvalidTierPolicy::Fallback,
            cancel_prior: true,
        }
    }
}

pub fn get_subscription_tiers() -> &'static [TierDefinition] {
    &TIERS
}

pub fn resolve_tier(raw: &str, policy: InvalidTierPolicy) -> Result<TierId, ApiError> {
    match (raw.parse::<TierId>(), policy) {
        (Ok(tier), _) => Ok(tier),
        (Err(e), InvalidTierPolicy::Fallback) => {
            warn!("{}; falling back to startup", e);
            Ok(TierId::Startup)
        }
        (Err(e), InvalidTierPolicy::Reject) => Err(ApiError::InvalidInput(e.to_string())),
    }
}

pub fn create_subscription(
    db: &Database,
    policy: SubscriptionPolicy,
    user_id: Uuid,
    req: CreateSubscriptionRequest,
) -> Result<Subscription, ApiError> {
    let tier = resolve_tier(&req.tier, policy.invalid_tier)?;
    let definition = tier.definition();

    let subscription = db.with_tx(|tx| {
        users::get_user(tx, user_id)?.ok_or(ApiError::NotFound("user"))?;

        let now = Utc::now();
        if policy.cancel_prior {
            let canceled = subscriptions::cancel_all_active(tx, user_id, now)?;
            if canceled > 0 {
                info!("Canceled {} prior subscription(s) of {}", canceled, user_id);
            }
        }

        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id,
            tier,
            status: SubscriptionStatus::Active,
            current_period_start: now,
            current_period_end: now + Duration::days(PERIOD_DAYS),
            features: tier.features(),
            monthly_revenue: tier.monthly_revenue(),
            stripe_customer_id: req.stripe_customer_id,
            stripe_subscription_id: req.stripe_subscription_id,
            created_at: now,
            canceled_at: None,
        };
        subscriptions::insert_subscription(tx, &subscription)?;
        users::set_subscription(
            tx,
            user_id,
            Some(tier),
            Some(subscription.id),
            definition.ai_credits,
            definition.plot_squares,
        )?;
        Ok::<_, ApiError>(subscription)
    })?;

    info!("User {} subscribed to {}", user_id, tier);
    Ok(subscription)
}

pub fn cancel_subscription(db: &Database, user_id: Uuid) -> Result<Subscription, ApiError> {
    let canceled = db.with_tx(|tx| {
        let user = users::get_user(tx, user_id)?.ok_or(ApiError::NotFound("user"))?;
        let current = match user.current_subscription_id {
            Some(id) => subscriptions::get_subscription(tx, id)?,
            None => None,
        };
        let current = current
            .filter(|s| s.status == SubscriptionStatus::Active)
            .ok_or(ApiError::NoActiveSubscription)?;

        let now = Utc::now();
        subscriptions::cancel(tx, current.id, now)?;
        users::set_subscription(tx, user_id, None, None, FREE_AI_CREDITS, FREE_SQUARES)?;

        Ok::<_, ApiError>(Subscription {
            status: SubscriptionStatus::Canceled,
            canceled_at: Some(now),
            ..current
        })
    })?;

    info!("User {} canceled subscription {}", user_id, canceled.id);
    Ok(canceled)
}

pub fn get_current_subscription(db: &Database, user_id: Uuid) -> Result<Option<Subscription>, ApiError> {
    db.with_conn(|conn| {
        let user = users::get_user(conn, user_id)?.ok_or(ApiError::NotFound("user"))?;
        let Some(id) = user.current_subscription_id else {
            return Ok(None);
        };
        Ok(subscriptions::get_subscription(conn, id)?
            .filter(|s| s.status == SubscriptionStatus::Active))
    })
}

pub fn get_usage_stats(db: &Database, user_id: Uuid) -> Result<UsageStats, ApiError> {
    let since = month_start(&Local::now());
    db.with_conn(|conn| {
        let user = users::get_user(conn, user_id)?.ok_or(ApiError::NotFound("user"))?;
        let (plot_count, total_area) = plots::owner_footprint(conn, user_id)?;
        let ai_interactions_this_month = ai::count_since(conn, user_id, since)?;

        Ok(UsageStats {
            tier: user.subscription_tier,
            plot_count,
            total_area,
            space_limit: user.free_squares_limit,
            ai_credits_used: user.ai_credits_used,
            ai_credits_limit: user.ai_credits_limit,
            ai_interactions_this_month,
        })
    })
}

pub fn record_ai_interaction(
    db: &Database,
    user_id: Uuid,
    req: RecordAiInteractionRequest,
) -> Result<AiInteraction, ApiError> {
    db.with_tx(|tx| {
        let user = users::get_user(tx, user_id)?.ok_or(ApiError::NotFound("user"))?;
        if let Some(plot_id) = req.plot_id {
            require_owned_plot(tx, user_id, plot_id)?;
        }
        if !user.ai_credits_limit.allows(user.ai_credits_used + 1) {
            return Err(ApiError::CreditLimitReached);
        }

        let interaction = AiInteraction {
            id: Uuid::new_v4(),
            user_id,
            plot_id: req.plot_id,
            kind: req
                .kind
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .unwrap_or_else(|| "chat".to_string()),
            created_at: Utc::now(),
        };
        ai::insert_interaction(tx, &interaction)?;
        users::increment_ai_credits_used(tx, user_id)?;
        Ok(interaction)
    })
}

/// Midnight on the first day of `now`'s month, in `now`'s time zone.
pub fn month_start<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let first = now
        .date_naive()
        .with_day(1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_else(|| now.naive_local());
    now.timezone()
        .from_local_datetime(&first)
        .earliest()
        .map(|start| start.with_timezone(&Utc))
        // Midnight skipped by a DST jump: fall back to reading it as UTC.
        .unwrap_or_else(|| first.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plots::test_support::{plot, user};
    use chrono::FixedOffset;
    use city_types::tiers::Limit;

    fn subscribe(db: &Database, policy: SubscriptionPolicy, user_id: Uuid, tier: &str) -> Result<Subscription, ApiError> {
        create_subscription(
            db,
            policy,
            user_id,
            CreateSubscriptionRequest {
                tier: tier.to_string(),
                stripe_customer_id: Some("cus_123".to_string()),
                stripe_subscription_id: None,
            },
        )
    }

    #[test]
    fn tiers_come_from_the_single_table() {
        let tiers = get_subscription_tiers();
        assert_eq!(tiers.len(), 4);
        assert_eq!(tiers[3].ai_credits, Limit::Unlimited);

        let sub_tier = TierId::Business.definition();
        assert!(tiers.iter().any(|t| t.id == sub_tier.id && t.price_usd == sub_tier.price_usd));
    }

    #[test]
    fn create_then_usage_reflects_new_limits() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        plot(&db, ann);

        let sub = subscribe(&db, SubscriptionPolicy::default(), ann, "business").unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.monthly_revenue, 9900);
        assert!(sub.features.priority_support);
        assert_eq!(sub.current_period_end - sub.current_period_start, Duration::days(30));

        let stats = get_usage_stats(&db, ann).unwrap();
        assert_eq!(stats.tier, Some(TierId::Business));
        assert_eq!(stats.ai_credits_limit, TierId::Business.definition().ai_credits);
        assert_eq!(stats.space_limit, TierId::Business.definition().plot_squares);
        assert_eq!((stats.plot_count, stats.total_area), (1, 4));
    }

    #[test]
    fn unknown_tier_follows_policy() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");

        let lenient = subscribe(&db, SubscriptionPolicy::default(), ann, "platinum").unwrap();
        assert_eq!(lenient.tier, TierId::Startup);

        let strict = SubscriptionPolicy {
            invalid_tier: InvalidTierPolicy::Reject,
            ..SubscriptionPolicy::default()
        };
        assert!(matches!(
            subscribe(&db, strict, ann, "platinum"),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn creating_again_cancels_prior_by_default() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");

        let first = subscribe(&db, SubscriptionPolicy::default(), ann, "startup").unwrap();
        let second = subscribe(&db, SubscriptionPolicy::default(), ann, "corporate").unwrap();

        let rows = db.with_conn(|conn| subscriptions::list_for_user(conn, ann)).unwrap();
        let active: Vec<_> = rows.iter().filter(|s| s.status == SubscriptionStatus::Active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
        assert!(rows.iter().any(|s| s.id == first.id && s.canceled_at.is_some()));
        assert_eq!(get_current_subscription(&db, ann).unwrap().unwrap().id, second.id);
    }

    #[test]
    fn keeping_prior_leaves_both_rows_live() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        let keep = SubscriptionPolicy {
            cancel_prior: false,
            ..SubscriptionPolicy::default()
        };

        subscribe(&db, keep, ann, "startup").unwrap();
        let latest = subscribe(&db, keep, ann, "business").unwrap();

        let rows = db.with_conn(|conn| subscriptions::list_for_user(conn, ann)).unwrap();
        assert!(rows.iter().all(|s| s.status == SubscriptionStatus::Active));
        assert_eq!(get_current_subscription(&db, ann).unwrap().unwrap().id, latest.id);
    }

    #[test]
    fn cancel_resets_to_free_limits() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");

        assert!(matches!(
            cancel_subscription(&db, ann),
            Err(ApiError::NoActiveSubscription)
        ));

        subscribe(&db, SubscriptionPolicy::default(), ann, "enterprise").unwrap();
        let canceled = cancel_subscription(&db, ann).unwrap();
        assert_eq!(canceled.status, SubscriptionStatus::Canceled);

        assert!(get_current_subscription(&db, ann).unwrap().is_none());
        let stats = get_usage_stats(&db, ann).unwrap();
        assert_eq!(stats.ai_credits_limit, Limit::Limited(100));
        assert_eq!(stats.space_limit, Limit::Limited(25));
        assert_eq!(stats.tier, None);

        assert!(matches!(
            cancel_subscription(&db, ann),
            Err(ApiError::NoActiveSubscription)
        ));
    }

    #[test]
    fn ai_interactions_count_against_credits() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        let bo = user(&db, "bo");
        let plot = plot(&db, ann);

        let req = || RecordAiInteractionRequest {
            plot_id: Some(plot.id),
            kind: None,
        };
        let recorded = record_ai_interaction(&db, ann, req()).unwrap();
        assert_eq!(recorded.kind, "chat");
        assert!(matches!(
            record_ai_interaction(&db, bo, req()),
            Err(ApiError::Unauthorized)
        ));

        let stats = get_usage_stats(&db, ann).unwrap();
        assert_eq!(stats.ai_credits_used, 1);
        assert_eq!(stats.ai_interactions_this_month, 1);

        // Exhaust the free allowance of 100.
        for _ in 1..100 {
            record_ai_interaction(&db, ann, RecordAiInteractionRequest::default()).unwrap();
        }
        assert!(matches!(
            record_ai_interaction(&db, ann, RecordAiInteractionRequest::default()),
            Err(ApiError::CreditLimitReached)
        ));
    }

    #[test]
    fn month_starts_at_local_midnight_on_the_first() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 3, 17, 15, 30, 0).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 2, 29, 22, 0, 0).unwrap();
        assert_eq!(month_start(&now), expected);

        let first_instant = tz.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(month_start(&first_instant), expected);
    }
}
