//! Schema migrations, applied on open.
//!
//! `PRAGMA user_version` records the last applied step; each step in
//! [`STEPS`] runs once, in order.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Step = (u32, &'static str, fn(&Connection) -> rusqlite::Result<()>);

const STEPS: &[Step] = &[(1, "v001_initial", v001_initial::up)];

/// Bring the mirror schema up to date.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let applied: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    for (version, name, up) in STEPS.iter().filter(|(v, _, _)| *v > applied) {
        tracing::info!(version, migration = name, "applying mirror migration");
        up(conn).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        conn.pragma_update(None, "user_version", version)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_ordered() {
        assert!(STEPS.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn running_twice_is_a_noop() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
