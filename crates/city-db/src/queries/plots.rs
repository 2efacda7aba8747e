use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use city_types::models::{Building, CompanyInfo, Mailbox, Plot, PlotSize};

use super::OptionalExt;
use crate::models::PlotRow;
use crate::to_millis;

const PLOT_COLUMNS: &str = "p.id, p.owner_id, p.position_x, p.position_z, p.width, p.depth, \
     p.building, p.company_info, p.mailbox_address, p.mailbox_enabled, p.created_at, p.updated_at";

pub fn insert_plot(conn: &Connection, plot: &Plot) -> Result<()> {
    let building = plot.building.as_ref().map(serde_json::to_string).transpose()?;
    let company_info = plot.company_info.as_ref().map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT INTO plots (id, owner_id, position_x, position_z, width, depth, building,
                            company_info, mailbox_address, mailbox_enabled, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            plot.id.to_string(),
            plot.owner_id.to_string(),
            plot.position.x,
            plot.position.z,
            plot.size.width,
            plot.size.depth,
            building,
            company_info,
            plot.mailbox.as_ref().map(|m| m.address.as_str()),
            plot.mailbox.as_ref().is_some_and(|m| m.enabled),
            to_millis(plot.created_at),
            to_millis(plot.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_plot(conn: &Connection, id: Uuid) -> Result<Option<Plot>> {
    let row = conn
        .query_row(
            &format!("SELECT {PLOT_COLUMNS} FROM plots p WHERE p.id = ?1"),
            [id.to_string()],
            map_plot_row,
        )
        .optional()?;
    row.map(Plot::try_from).transpose()
}

/// Plot plus the owner's username, for public listings.
pub fn get_plot_with_owner(conn: &Connection, id: Uuid) -> Result<Option<(Plot, String)>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {PLOT_COLUMNS}, u.username FROM plots p
                 JOIN users u ON u.id = p.owner_id
                 WHERE p.id = ?1"
            ),
            [id.to_string()],
            map_plot_with_owner,
        )
        .optional()?;
    row.map(|(plot, owner)| Ok::<_, anyhow::Error>((Plot::try_from(plot)?, owner))).transpose()
}

pub fn list_plots_with_owner(conn: &Connection) -> Result<Vec<(Plot, String)>> {
    query_with_owner(conn, "1 = 1", params![])
}

pub fn list_company_plots(conn: &Connection) -> Result<Vec<(Plot, String)>> {
    query_with_owner(conn, "p.company_info IS NOT NULL", params![])
}

/// Exact match on the advertised company name.
pub fn search_company_plots(conn: &Connection, company_name: &str) -> Result<Vec<(Plot, String)>> {
    query_with_owner(
        conn,
        "p.company_info IS NOT NULL AND json_extract(p.company_info, '$.company_name') = ?1",
        params![company_name],
    )
}

pub fn list_plots_by_owner(conn: &Connection, owner_id: Uuid) -> Result<Vec<Plot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PLOT_COLUMNS} FROM plots p WHERE p.owner_id = ?1 ORDER BY p.created_at, p.id"
    ))?;
    let rows = stmt
        .query_map([owner_id.to_string()], map_plot_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(Plot::try_from).collect()
}

/// Lookup through the `by_mailbox_address` index.
pub fn find_by_mailbox_address(conn: &Connection, address: &str) -> Result<Option<Plot>> {
    let row = conn
        .query_row(
            &format!("SELECT {PLOT_COLUMNS} FROM plots p WHERE p.mailbox_address = ?1"),
            [address],
            map_plot_row,
        )
        .optional()?;
    row.map(Plot::try_from).transpose()
}

/// Number of plots and their summed area for one owner. Summed here rather
/// than with SQL `SUM`, which fails once the total leaves the i64 range.
pub fn owner_footprint(conn: &Connection, owner_id: Uuid) -> Result<(u64, u64)> {
    let mut stmt = conn.prepare("SELECT width, depth FROM plots WHERE owner_id = ?1")?;
    let sizes = stmt
        .query_map([owner_id.to_string()], |r| {
            Ok(PlotSize {
                width: r.get(0)?,
                depth: r.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let area = sizes
        .iter()
        .fold(0u64, |total, size| total.saturating_add(size.area()));
    Ok((sizes.len() as u64, area))
}

/// Plots of `owner_id` with a mailbox address, not counting `except`.
pub fn count_mailboxes(conn: &Connection, owner_id: Uuid, except: Uuid) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM plots
         WHERE owner_id = ?1 AND mailbox_address IS NOT NULL AND id != ?2",
        [owner_id.to_string(), except.to_string()],
        |r| r.get(0),
    )?;
    Ok(count.max(0) as u64)
}

pub fn set_building(
    conn: &Connection,
    id: Uuid,
    building: Option<&Building>,
    now: DateTime<Utc>,
) -> Result<()> {
    let building = building.map(serde_json::to_string).transpose()?;
    conn.execute(
        "UPDATE plots SET building = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), building, to_millis(now)],
    )?;
    Ok(())
}

pub fn set_company_info(
    conn: &Connection,
    id: Uuid,
    info: Option<&CompanyInfo>,
    now: DateTime<Utc>,
) -> Result<()> {
    let info = info.map(serde_json::to_string).transpose()?;
    conn.execute(
        "UPDATE plots SET company_info = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), info, to_millis(now)],
    )?;
    Ok(())
}

/// Fails with a constraint violation when another plot already holds the
/// address (see `crate::is_constraint_violation`).
pub fn set_mailbox(
    conn: &Connection,
    id: Uuid,
    mailbox: Option<&Mailbox>,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE plots SET mailbox_address = ?2, mailbox_enabled = ?3, updated_at = ?4 WHERE id = ?1",
        params![
            id.to_string(),
            mailbox.map(|m| m.address.as_str()),
            mailbox.is_some_and(|m| m.enabled),
            to_millis(now),
        ],
    )?;
    Ok(())
}

pub fn delete_plot(conn: &Connection, id: Uuid) -> Result<bool> {
    let removed = conn.execute("DELETE FROM plots WHERE id = ?1", [id.to_string()])?;
    Ok(removed == 1)
}

fn query_with_owner<P: rusqlite::Params>(
    conn: &Connection,
    filter: &str,
    params: P,
) -> Result<Vec<(Plot, String)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PLOT_COLUMNS}, u.username FROM plots p
         JOIN users u ON u.id = p.owner_id
         WHERE {filter}
         ORDER BY p.created_at, p.id"
    ))?;
    let rows = stmt
        .query_map(params, map_plot_with_owner)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(plot, owner)| Ok::<_, anyhow::Error>((Plot::try_from(plot)?, owner)))
        .collect()
}

fn map_plot_row(row: &Row<'_>) -> rusqlite::Result<PlotRow> {
    Ok(PlotRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        position_x: row.get(2)?,
        position_z: row.get(3)?,
        width: row.get(4)?,
        depth: row.get(5)?,
        building: row.get(6)?,
        company_info: row.get(7)?,
        mailbox_address: row.get(8)?,
        mailbox_enabled: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn map_plot_with_owner(row: &Row<'_>) -> rusqlite::Result<(PlotRow, String)> {
    Ok((map_plot_row(row)?, row.get(12)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support;
    use crate::{Database, is_constraint_violation};

    fn info(name: &str) -> CompanyInfo {
        CompanyInfo {
            company_name: name.to_string(),
            website: None,
            logo: None,
            description: None,
            uploaded_at: Utc::now(),
        }
    }

    #[test]
    fn company_search_is_exact() {
        let db = Database::open_in_memory().unwrap();
        let found = db
            .with_conn(|conn| {
                let owner = test_support::user(conn, "ann");
                let a = test_support::plot(conn, owner);
                let b = test_support::plot(conn, owner);
                test_support::plot(conn, owner);
                set_company_info(conn, a.id, Some(&info("Acme")), Utc::now())?;
                set_company_info(conn, b.id, Some(&info("Acme Corp")), Utc::now())?;

                assert_eq!(list_company_plots(conn)?.len(), 2);
                search_company_plots(conn, "Acme")
            })
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1, "ann");
        assert_eq!(found[0].0.company_info.as_ref().unwrap().company_name, "Acme");
    }

    #[test]
    fn mailbox_address_is_unique() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .with_conn(|conn| {
                let owner = test_support::user(conn, "ann");
                let a = test_support::plot(conn, owner);
                let b = test_support::plot(conn, owner);
                let mailbox = Mailbox {
                    address: "ann.shop".to_string(),
                    enabled: true,
                };
                set_mailbox(conn, a.id, Some(&mailbox), Utc::now())?;
                let found = find_by_mailbox_address(conn, "ann.shop")?.unwrap();
                assert_eq!(found.id, a.id);
                set_mailbox(conn, b.id, Some(&mailbox), Utc::now())
            })
            .unwrap_err();
        assert!(is_constraint_violation(&err));
    }

    #[test]
    fn footprint_sums_area() {
        let db = Database::open_in_memory().unwrap();
        let (count, area) = db
            .with_conn(|conn| {
                let owner = test_support::user(conn, "ann");
                test_support::plot(conn, owner);
                test_support::plot(conn, owner);
                owner_footprint(conn, owner)
            })
            .unwrap();
        assert_eq!((count, area), (2, 12));
    }

    #[test]
    fn footprint_saturates_instead_of_failing() {
        let db = Database::open_in_memory().unwrap();
        let (count, area) = db
            .with_conn(|conn| {
                let owner = test_support::user(conn, "ann");
                for _ in 0..3 {
                    let mut plot = test_support::plot(conn, owner);
                    plot.id = Uuid::new_v4();
                    plot.size = PlotSize {
                        width: i64::MAX / 2,
                        depth: 2,
                    };
                    insert_plot(conn, &plot)?;
                }
                owner_footprint(conn, owner)
            })
            .unwrap();
        assert_eq!(count, 6);
        assert_eq!(area, u64::MAX);
    }
}
