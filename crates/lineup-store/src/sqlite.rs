//! SQLite persistence for ranks.
//!
//! One row per item. `rank` is stored as TEXT with `COLLATE BINARY`, so
//! `ORDER BY rank` matches [`lineup_rank::compare`] exactly, and a unique
//! index on `(scope_id, rank)` makes ties impossible at rest.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use lineup_rank::Rank;
use lineup_types::{ItemId, RankedEntry, ScopeId};

use crate::store::validate_batch;
use crate::{OrderStore, Result, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS order_items (
    scope_id TEXT NOT NULL,
    item_id TEXT NOT NULL,
    rank TEXT NOT NULL COLLATE BINARY,
    PRIMARY KEY (scope_id, item_id)
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_order_items_rank ON order_items(scope_id, rank);
"#;

/// Order store backed by a SQLite database.
pub struct SqliteOrderStore {
    conn: Mutex<Connection>,
}

impl SqliteOrderStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// All scopes that currently hold at least one item.
    pub fn scopes(&self) -> Result<Vec<ScopeId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT scope_id FROM order_items ORDER BY scope_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.map(|r| parse_scope(&r?)).collect()
    }
}

fn parse_item(s: &str) -> Result<ItemId> {
    ItemId::parse(s).map_err(|e| StoreError::Corrupt(format!("item id {s:?}: {e}")))
}

fn parse_scope(s: &str) -> Result<ScopeId> {
    ScopeId::parse(s).map_err(|e| StoreError::Corrupt(format!("scope id {s:?}: {e}")))
}

fn parse_rank(s: &str) -> Result<Rank> {
    Rank::parse(s).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn holder_of(conn: &Connection, scope: ScopeId, rank: &Rank) -> Result<Option<ItemId>> {
    let holder: Option<String> = conn
        .query_row(
            "SELECT item_id FROM order_items WHERE scope_id = ?1 AND rank = ?2",
            params![scope.to_string(), rank.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    holder.as_deref().map(parse_item).transpose()
}

/// Map a unique-index violation onto `Conflict`; another process may have
/// claimed the rank between our check and our write.
fn map_write_error(err: rusqlite::Error, scope: ScopeId, rank: &Rank) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            StoreError::Conflict {
                scope_id: scope,
                rank: rank.clone(),
                holder: None,
            }
        }
        other => StoreError::Sqlite(other),
    }
}

impl OrderStore for SqliteOrderStore {
    fn list_sorted(&self, scope: ScopeId) -> Result<Vec<RankedEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT item_id, rank FROM order_items WHERE scope_id = ?1 ORDER BY rank",
        )?;
        let rows = stmt.query_map(params![scope.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        rows.map(|r| {
            let (id, rank) = r?;
            Ok(RankedEntry::new(parse_item(&id)?, parse_rank(&rank)?))
        })
        .collect()
    }

    fn rank_of(&self, scope: ScopeId, item: ItemId) -> Result<Option<Rank>> {
        let conn = self.conn.lock();
        let rank: Option<String> = conn
            .query_row(
                "SELECT rank FROM order_items WHERE scope_id = ?1 AND item_id = ?2",
                params![scope.to_string(), item.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        rank.as_deref().map(parse_rank).transpose()
    }

    fn insert(&self, scope: ScopeId, item: ItemId, rank: Rank) -> Result<()> {
        let conn = self.conn.lock();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM order_items WHERE scope_id = ?1 AND item_id = ?2",
                params![scope.to_string(), item.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::Duplicate {
                scope_id: scope,
                item_id: item,
            });
        }
        if let Some(holder) = holder_of(&conn, scope, &rank)? {
            return Err(StoreError::Conflict {
                scope_id: scope,
                rank,
                holder: Some(holder),
            });
        }
        conn.execute(
            "INSERT INTO order_items (scope_id, item_id, rank) VALUES (?1, ?2, ?3)",
            params![scope.to_string(), item.to_string(), rank.as_str()],
        )
        .map_err(|e| map_write_error(e, scope, &rank))?;
        Ok(())
    }

    fn set_rank(&self, scope: ScopeId, item: ItemId, rank: Rank) -> Result<()> {
        let conn = self.conn.lock();
        match holder_of(&conn, scope, &rank)? {
            Some(holder) if holder == item => return Ok(()),
            Some(holder) => {
                return Err(StoreError::Conflict {
                    scope_id: scope,
                    rank,
                    holder: Some(holder),
                });
            }
            None => {}
        }
        let updated = conn
            .execute(
                "UPDATE order_items SET rank = ?3 WHERE scope_id = ?1 AND item_id = ?2",
                params![scope.to_string(), item.to_string(), rank.as_str()],
            )
            .map_err(|e| map_write_error(e, scope, &rank))?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                scope_id: scope,
                item_id: item,
            });
        }
        Ok(())
    }

    fn remove(&self, scope: ScopeId, item: ItemId) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM order_items WHERE scope_id = ?1 AND item_id = ?2",
            params![scope.to_string(), item.to_string()],
        )?;
        Ok(deleted > 0)
    }

    fn replace_all(&self, scope: ScopeId, entries: &[RankedEntry]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("SELECT item_id FROM order_items WHERE scope_id = ?1")?;
            let current = stmt
                .query_map(params![scope.to_string()], |row| row.get::<_, String>(0))?
                .map(|r| parse_item(&r?))
                .collect::<Result<Vec<_>>>()?;
            validate_batch(scope, current, entries)?;
        }
        // Delete-then-insert so the unique rank index never sees a transient tie.
        tx.execute(
            "DELETE FROM order_items WHERE scope_id = ?1",
            params![scope.to_string()],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO order_items (scope_id, item_id, rank) VALUES (?1, ?2, ?3)",
            )?;
            for e in entries {
                insert.execute(params![scope.to_string(), e.id.to_string(), e.rank.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rank(s: &str) -> Rank {
        Rank::parse(s).unwrap()
    }

    #[test]
    fn test_order_matches_rank_compare() {
        let store = SqliteOrderStore::in_memory().unwrap();
        let scope = ScopeId::new();
        // Mixed case and digits: NOCASE or numeric collation would misorder these.
        let ranks = ["a", "Z", "9", "aV", "V", "z1"];
        for r in ranks {
            store.insert(scope, ItemId::new(), rank(r)).unwrap();
        }
        let listed: Vec<String> = store
            .list_sorted(scope)
            .unwrap()
            .into_iter()
            .map(|e| e.rank.to_string())
            .collect();
        let mut expected: Vec<Rank> = ranks.iter().map(|r| rank(r)).collect();
        expected.sort_by(lineup_rank::compare);
        let expected: Vec<String> = expected.into_iter().map(String::from).collect();
        assert_eq!(listed, expected);
    }

    #[test]
    fn test_conflicts_and_not_found() {
        let store = SqliteOrderStore::in_memory().unwrap();
        let scope = ScopeId::new();
        let (a, b) = (ItemId::new(), ItemId::new());
        store.insert(scope, a, rank("m")).unwrap();
        store.insert(scope, b, rank("t")).unwrap();

        assert!(matches!(
            store.set_rank(scope, b, rank("m")),
            Err(StoreError::Conflict { holder: Some(h), .. }) if h == a
        ));
        assert!(matches!(
            store.insert(scope, ItemId::new(), rank("t")),
            Err(StoreError::Conflict { .. })
        ));
        assert!(matches!(
            store.insert(scope, a, rank("x")),
            Err(StoreError::Duplicate { .. })
        ));
        assert!(matches!(
            store.set_rank(scope, ItemId::new(), rank("x")),
            Err(StoreError::NotFound { .. })
        ));
        store.set_rank(scope, a, rank("m")).unwrap();
    }

    #[test]
    fn test_set_rank_and_remove() {
        let store = SqliteOrderStore::in_memory().unwrap();
        let scope = ScopeId::new();
        let (a, b) = (ItemId::new(), ItemId::new());
        store.insert(scope, a, rank("m")).unwrap();
        store.insert(scope, b, rank("t")).unwrap();
        store.set_rank(scope, a, rank("w")).unwrap();
        assert_eq!(store.rank_of(scope, a).unwrap(), Some(rank("w")));
        assert!(store.remove(scope, b).unwrap());
        assert_eq!(store.rank_of(scope, b).unwrap(), None);
        assert_eq!(store.list_sorted(scope).unwrap().len(), 1);
    }

    #[test]
    fn test_replace_all_is_transactional() {
        let store = SqliteOrderStore::in_memory().unwrap();
        let scope = ScopeId::new();
        let (a, b, c) = (ItemId::new(), ItemId::new(), ItemId::new());
        store.insert(scope, a, rank("a")).unwrap();
        store.insert(scope, b, rank("aV")).unwrap();
        store.insert(scope, c, rank("aVV")).unwrap();

        // Swaps ranks between items: only safe because the old rows go first.
        let batch = vec![
            RankedEntry::new(a, rank("F")),
            RankedEntry::new(b, rank("V")),
            RankedEntry::new(c, rank("a")),
        ];
        store.replace_all(scope, &batch).unwrap();
        assert_eq!(store.list_sorted(scope).unwrap(), batch);

        let stale = vec![RankedEntry::new(a, rank("1"))];
        assert!(matches!(
            store.replace_all(scope, &stale),
            Err(StoreError::StaleBatch { .. })
        ));
        assert_eq!(store.list_sorted(scope).unwrap(), batch);
    }

    #[test]
    fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lineup.db");
        let scope = ScopeId::named("profile-7");
        let item = ItemId::new();
        {
            let store = SqliteOrderStore::open(&path).unwrap();
            store.insert(scope, item, rank("V")).unwrap();
        }
        let store = SqliteOrderStore::open(&path).unwrap();
        assert_eq!(store.rank_of(scope, item).unwrap(), Some(rank("V")));
        assert_eq!(store.scopes().unwrap(), vec![scope]);
    }
}
