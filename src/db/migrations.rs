use anyhow::Context;
use rusqlite::Connection;

/// Schema migrations compiled into the binary, applied in order.
const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_init.sql",
    include_str!("../../migrations/0001_init.sql"),
)];

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .context("failed to create migrations table")?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .context("failed to check migration status")?;

        if already_applied {
            continue;
        }

        conn.execute_batch(sql)
            .with_context(|| format!("failed to apply migration: {name}"))?;

        conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])
            .with_context(|| format!("failed to record migration: {name}"))?;

        tracing::info!("applied migration: {name}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_schema_rejects_pending_with_mechanic() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO repairs (id, user_id, mechanic_id, reg_number, postcode, make, model, year,
                transmission, fuel_type, work_types, full_name, phone, email, address1, city, state,
                country, problem_description, availability, status, created_at, updated_at)
             VALUES ('r1', 'u1', 'm1', 'ABC-123DE', '100001', 'Toyota', 'Corolla', 2015,
                'Manual', 'Petrol', '[]', 'Ada', '08012345678', 'ada@example.com', '1 Road',
                'Lagos', 'Lagos', 'Nigeria', 'Engine knocks loudly', '[]', 'pending',
                '2025-01-01 00:00:00', '2025-01-01 00:00:00')",
            [],
        );
        assert!(result.is_err());
    }
}
