//! Plot store operations and the ownership gate every plot mutation
//! goes through.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use city_db::queries::{plots, users};
use city_db::{Connection, Database, is_constraint_violation};
use city_types::api::{ConfigureMailboxRequest, CreatePlotRequest, PublicPlot, UpdateBuildingRequest};
use city_types::models::{Mailbox, Plot};
use city_types::tiers;

use crate::error::ApiError;

/// Load `plot_id` and check that `user_id` owns it.
pub fn require_owned_plot(conn: &Connection, user_id: Uuid, plot_id: Uuid) -> Result<Plot, ApiError> {
    let plot = plots::get_plot(conn, plot_id)?.ok_or(ApiError::NotFound("plot"))?;
    if plot.owner_id != user_id {
        warn!("User {} attempted to modify plot {} owned by {}", user_id, plot_id, plot.owner_id);
        return Err(ApiError::Unauthorized);
    }
    Ok(plot)
}

pub fn create_plot(db: &Database, user_id: Uuid, req: CreatePlotRequest) -> Result<Plot, ApiError> {
    if !req.size.is_valid() {
        return Err(ApiError::invalid("plot width and depth must be positive"));
    }
    let Some(area) = req.size.checked_area() else {
        return Err(ApiError::invalid("plot area is too large"));
    };
    if !req.position.x.is_finite() || !req.position.z.is_finite() {
        return Err(ApiError::invalid("plot position must be finite"));
    }

    let plot = db.with_tx(|tx| {
        let user = users::get_user(tx, user_id)?.ok_or(ApiError::NotFound("user"))?;
        let (_, used) = plots::owner_footprint(tx, user_id)?;
        if !user.free_squares_limit.allows(used.saturating_add(area)) {
            return Err(ApiError::InvalidInput(format!(
                "a {} square plot exceeds the space allowance ({} of {} used)",
                area,
                used,
                user.free_squares_limit.as_i64()
            )));
        }

        let now = Utc::now();
        let plot = Plot {
            id: Uuid::new_v4(),
            owner_id: user_id,
            position: req.position,
            size: req.size,
            building: req.building,
            company_info: None,
            mailbox: None,
            created_at: now,
            updated_at: now,
        };
        plots::insert_plot(tx, &plot)?;
        Ok(plot)
    })?;

    info!("Plot {} created by {}", plot.id, user_id);
    Ok(plot)
}

pub fn get_plot(db: &Database, plot_id: Uuid) -> Result<PublicPlot, ApiError> {
    db.with_conn(|conn| plots::get_plot_with_owner(conn, plot_id))?
        .map(public_view)
        .ok_or(ApiError::NotFound("plot"))
}

pub fn list_plots(db: &Database) -> Result<Vec<PublicPlot>, ApiError> {
    let rows = db.with_conn(plots::list_plots_with_owner)?;
    Ok(rows.into_iter().map(public_view).collect())
}

pub fn get_my_plots(db: &Database, user_id: Uuid) -> Result<Vec<Plot>, ApiError> {
    Ok(db.with_conn(|conn| plots::list_plots_by_owner(conn, user_id))?)
}

pub fn update_building(
    db: &Database,
    user_id: Uuid,
    plot_id: Uuid,
    req: UpdateBuildingRequest,
) -> Result<Plot, ApiError> {
    db.with_tx(|tx| {
        let plot = require_owned_plot(tx, user_id, plot_id)?;
        let now = Utc::now();
        plots::set_building(tx, plot_id, req.building.as_ref(), now)?;
        Ok(Plot {
            building: req.building,
            updated_at: now,
            ..plot
        })
    })
}

pub fn configure_mailbox(
    db: &Database,
    user_id: Uuid,
    plot_id: Uuid,
    req: ConfigureMailboxRequest,
) -> Result<Plot, ApiError> {
    db.with_tx(|tx| {
        let plot = require_owned_plot(tx, user_id, plot_id)?;

        let address = match req.address.as_deref() {
            Some(raw) => Some(normalize_address(raw)?),
            None => plot.mailbox.as_ref().map(|m| m.address.clone()),
        };
        let Some(address) = address else {
            if req.enabled {
                return Err(ApiError::invalid("an address is required to enable a mailbox"));
            }
            return Ok(plot);
        };

        if plot.mailbox.is_none() {
            let user = users::get_user(tx, user_id)?.ok_or(ApiError::NotFound("user"))?;
            let existing = plots::count_mailboxes(tx, user_id, plot_id)?;
            if !tiers::mailbox_limit(user.subscription_tier).allows(existing + 1) {
                return Err(ApiError::invalid("mailbox allowance for your plan is used up"));
            }
        }

        // The unique index settles races; the lookup just gives a clean error
        // in the common case.
        if let Some(holder) = plots::find_by_mailbox_address(tx, &address)? {
            if holder.id != plot_id {
                return Err(address_taken());
            }
        }

        let mailbox = Mailbox {
            address,
            enabled: req.enabled,
        };
        let now = Utc::now();
        plots::set_mailbox(tx, plot_id, Some(&mailbox), now).map_err(|e| {
            if is_constraint_violation(&e) {
                address_taken()
            } else {
                ApiError::Internal(e)
            }
        })?;

        info!(
            "Plot {} mailbox set to '{}' (enabled: {})",
            plot_id, mailbox.address, mailbox.enabled
        );
        Ok(Plot {
            mailbox: Some(mailbox),
            updated_at: now,
            ..plot
        })
    })
}

pub fn delete_plot(db: &Database, user_id: Uuid, plot_id: Uuid) -> Result<(), ApiError> {
    db.with_tx(|tx| {
        require_owned_plot(tx, user_id, plot_id)?;
        plots::delete_plot(tx, plot_id)?;
        Ok::<_, ApiError>(())
    })?;
    info!("Plot {} deleted by {}", plot_id, user_id);
    Ok(())
}

/// Mailbox addresses are case-insensitive: stored trimmed and lowercased,
/// 3-64 characters of `[a-z0-9._-]`.
pub fn normalize_address(raw: &str) -> Result<String, ApiError> {
    let address = raw.trim().to_ascii_lowercase();
    let valid_chars = address
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));
    if !(3..=64).contains(&address.len()) || !valid_chars {
        return Err(ApiError::invalid(
            "mailbox address must be 3-64 characters of a-z, 0-9, '.', '_' or '-'",
        ));
    }
    Ok(address)
}

pub(crate) fn public_view((plot, owner_username): (Plot, String)) -> PublicPlot {
    PublicPlot {
        id: plot.id,
        owner_username,
        position: plot.position,
        size: plot.size,
        building: plot.building,
        company_info: plot.company_info,
        mailbox: plot.mailbox,
        updated_at: plot.updated_at,
    }
}

fn address_taken() -> ApiError {
    ApiError::Conflict("mailbox address already claimed".into())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use city_types::models::{PlotSize, Position};

    pub fn user(db: &Database, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.with_conn(|conn| users::insert_user(conn, id, username, "hash", None, None, Utc::now()))
            .unwrap();
        id
    }

    pub fn plot(db: &Database, owner: Uuid) -> Plot {
        create_plot(
            db,
            owner,
            CreatePlotRequest {
                position: Position { x: 0.0, z: 0.0 },
                size: PlotSize { width: 2, depth: 2 },
                building: None,
            },
        )
        .unwrap()
    }

    /// A plot with an enabled mailbox at `address`.
    pub fn plot_with_mailbox(db: &Database, owner: Uuid, address: &str) -> Plot {
        let plot = plot(db, owner);
        configure_mailbox(
            db,
            owner,
            plot.id,
            ConfigureMailboxRequest {
                address: Some(address.to_string()),
                enabled: true,
            },
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use city_types::models::{Building, PlotSize, Position};

    fn plot_req(width: i64, depth: i64) -> CreatePlotRequest {
        CreatePlotRequest {
            position: Position { x: 10.0, z: -4.0 },
            size: PlotSize { width, depth },
            building: None,
        }
    }

    fn mailbox_req(address: Option<&str>, enabled: bool) -> ConfigureMailboxRequest {
        ConfigureMailboxRequest {
            address: address.map(str::to_string),
            enabled,
        }
    }

    #[test]
    fn non_owner_mutations_are_unauthorized() {
        let db = Database::open_in_memory().unwrap();
        let owner = user(&db, "ann");
        let intruder = user(&db, "bo");
        let plot = plot(&db, owner);

        let building = UpdateBuildingRequest {
            building: Some(Building {
                style: "tower".into(),
                color: "#fff".into(),
                floors: 3,
            }),
        };
        assert!(matches!(
            update_building(&db, intruder, plot.id, building),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            configure_mailbox(&db, intruder, plot.id, mailbox_req(Some("bo.box"), true)),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            delete_plot(&db, intruder, plot.id),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            delete_plot(&db, owner, Uuid::new_v4()),
            Err(ApiError::NotFound("plot"))
        ));
    }

    #[test]
    fn plot_size_must_be_positive_and_within_allowance() {
        let db = Database::open_in_memory().unwrap();
        let owner = user(&db, "ann");

        assert!(matches!(
            create_plot(&db, owner, plot_req(0, 3)),
            Err(ApiError::InvalidInput(_))
        ));
        // Free plan: 25 squares in total.
        create_plot(&db, owner, plot_req(4, 4)).unwrap();
        assert!(matches!(
            create_plot(&db, owner, plot_req(3, 4)),
            Err(ApiError::InvalidInput(_))
        ));
        create_plot(&db, owner, plot_req(3, 3)).unwrap();
        assert_eq!(get_my_plots(&db, owner).unwrap().len(), 2);
    }

    #[test]
    fn unlimited_plan_still_rejects_overflowing_area() {
        let db = Database::open_in_memory().unwrap();
        let owner = user(&db, "ann");
        db.with_conn(|conn| {
            users::set_subscription(
                conn,
                owner,
                Some(tiers::TierId::Enterprise),
                None,
                tiers::Limit::Unlimited,
                tiers::Limit::Unlimited,
            )
        })
        .unwrap();

        assert!(matches!(
            create_plot(&db, owner, plot_req(i64::MAX / 2, 4)),
            Err(ApiError::InvalidInput(_))
        ));

        // Each fits on its own; together they exceed i64.
        create_plot(&db, owner, plot_req(i64::MAX / 2, 2)).unwrap();
        create_plot(&db, owner, plot_req(i64::MAX / 2, 2)).unwrap();
        create_plot(&db, owner, plot_req(1, 1)).unwrap();

        let (count, area) = db
            .with_conn(|conn| plots::owner_footprint(conn, owner))
            .unwrap();
        assert_eq!(count, 3);
        assert!(area > i64::MAX as u64);
    }

    #[test]
    fn mailbox_address_cannot_be_claimed_twice() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        let bo = user(&db, "bo");
        plot_with_mailbox(&db, ann, "Shop.Front");
        let other = plot(&db, bo);

        let err = configure_mailbox(&db, bo, other.id, mailbox_req(Some("shop.front"), true))
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn mailbox_can_be_toggled_without_resending_address() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        let plot = plot_with_mailbox(&db, ann, "ann.home");
        assert_eq!(plot.mailbox.as_ref().unwrap().address, "ann.home");

        let disabled = configure_mailbox(&db, ann, plot.id, mailbox_req(None, false)).unwrap();
        assert_eq!(
            disabled.mailbox,
            Some(Mailbox {
                address: "ann.home".into(),
                enabled: false
            })
        );

        let fresh = super::test_support::plot(&db, ann);
        assert!(matches!(
            configure_mailbox(&db, ann, fresh.id, mailbox_req(None, true)),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn free_plan_allows_one_mailbox() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        plot_with_mailbox(&db, ann, "ann.one");
        let second = plot(&db, ann);
        assert!(matches!(
            configure_mailbox(&db, ann, second.id, mailbox_req(Some("ann.two"), true)),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn address_validation() {
        assert_eq!(normalize_address("  My-Shop_1 ").unwrap(), "my-shop_1");
        assert!(normalize_address("ab").is_err());
        assert!(normalize_address("has space").is_err());
        assert!(normalize_address("emoji🙂").is_err());
    }

    #[test]
    fn public_listing_hides_owner_id() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        let plot = plot(&db, ann);

        let public = get_plot(&db, plot.id).unwrap();
        assert_eq!(public.owner_username, "ann");
        let json = serde_json::to_value(&public).unwrap();
        assert!(json.get("owner_id").is_none());
        assert_eq!(list_plots(&db).unwrap().len(), 1);
    }
}
