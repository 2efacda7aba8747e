use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub const LATEST_VERSION: i64 = 1;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                      TEXT PRIMARY KEY,
                username                TEXT NOT NULL UNIQUE,
                password                TEXT NOT NULL,
                email                   TEXT,
                nickname                TEXT,
                subscription_tier       TEXT,
                current_subscription_id TEXT,
                ai_credits_used         INTEGER NOT NULL DEFAULT 0,
                ai_credits_limit        INTEGER NOT NULL DEFAULT 100,
                free_squares_limit      INTEGER NOT NULL DEFAULT 25,
                created_at              INTEGER NOT NULL
            );

            CREATE TABLE plots (
                id              TEXT PRIMARY KEY,
                owner_id        TEXT NOT NULL REFERENCES users(id),
                position_x      REAL NOT NULL,
                position_z      REAL NOT NULL,
                width           INTEGER NOT NULL CHECK (width > 0),
                depth           INTEGER NOT NULL CHECK (depth > 0),
                building        TEXT,
                company_info    TEXT,
                mailbox_address TEXT,
                mailbox_enabled INTEGER NOT NULL DEFAULT 0,
                created_at      INTEGER NOT NULL,
                updated_at      INTEGER NOT NULL
            );

            CREATE INDEX by_owner ON plots(owner_id);

            -- Address uniqueness lives in the store, not in the handlers.
            -- NULLs (plots without a mailbox) never collide.
            CREATE UNIQUE INDEX by_mailbox_address ON plots(mailbox_address);

            CREATE TABLE mail_messages (
                id                TEXT PRIMARY KEY,
                plot_id           TEXT NOT NULL REFERENCES plots(id) ON DELETE CASCADE,
                sender_id         TEXT,
                sender_name       TEXT NOT NULL,
                recipient_address TEXT NOT NULL,
                subject           TEXT NOT NULL,
                body              TEXT NOT NULL,
                message_type      TEXT NOT NULL DEFAULT 'user_message',
                timestamp         INTEGER NOT NULL,
                is_read           INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX by_plot_id_timestamp ON mail_messages(plot_id, timestamp, id);

            CREATE TABLE subscriptions (
                id                     TEXT PRIMARY KEY,
                user_id                TEXT NOT NULL REFERENCES users(id),
                tier                   TEXT NOT NULL,
                status                 TEXT NOT NULL,
                current_period_start   INTEGER NOT NULL,
                current_period_end     INTEGER NOT NULL,
                features               TEXT NOT NULL,
                monthly_revenue        INTEGER NOT NULL,
                stripe_customer_id     TEXT,
                stripe_subscription_id TEXT,
                created_at             INTEGER NOT NULL,
                canceled_at            INTEGER
            );

            CREATE INDEX subscriptions_by_user ON subscriptions(user_id, status);

            CREATE TABLE ai_interactions (
                id         TEXT PRIMARY KEY,
                user_id    TEXT NOT NULL REFERENCES users(id),
                plot_id    TEXT REFERENCES plots(id) ON DELETE SET NULL,
                kind       TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX ai_interactions_by_user ON ai_interactions(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
