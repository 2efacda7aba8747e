use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use city_types::models::AiInteraction;

use crate::to_millis;

pub fn insert_interaction(conn: &Connection, interaction: &AiInteraction) -> Result<()> {
    conn.execute(
        "INSERT INTO ai_interactions (id, user_id, plot_id, kind, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            interaction.id.to_string(),
            interaction.user_id.to_string(),
            interaction.plot_id.map(|id| id.to_string()),
            interaction.kind,
            to_millis(interaction.created_at),
        ],
    )?;
    Ok(())
}

pub fn count_since(conn: &Connection, user_id: Uuid, since: DateTime<Utc>) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM ai_interactions WHERE user_id = ?1 AND created_at >= ?2",
        params![user_id.to_string(), to_millis(since)],
        |r| r.get(0),
    )?;
    Ok(count.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::queries::test_support;
    use chrono::Duration;

    #[test]
    fn counts_only_records_after_boundary() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let count = db
            .with_conn(|conn| {
                let user = test_support::user(conn, "ann");
                for created_at in [now - Duration::days(40), now - Duration::hours(1), now] {
                    insert_interaction(
                        conn,
                        &AiInteraction {
                            id: Uuid::new_v4(),
                            user_id: user,
                            plot_id: None,
                            kind: "chat".to_string(),
                            created_at,
                        },
                    )?;
                }
                count_since(conn, user, now - Duration::days(1))
            })
            .unwrap();
        assert_eq!(count, 2);
    }
}
