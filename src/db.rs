use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::cat::Cat;
use crate::mapper::CatMapper;

/// Audit record written for every mutation of the cats table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery (in-memory databases silently stay on "memory")
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!(journal_mode = %mode, "database opened");

    // ==========================================================================
    // Cats Table (name is the identity key)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cats (
            name TEXT PRIMARY KEY NOT NULL,
            sex TEXT NOT NULL,
            age INTEGER NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute("CREATE INDEX IF NOT EXISTS idx_cats_sex ON cats(sex)", [])?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_cats_age ON cats(age)", [])?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Load cats from a CSV file with a `name,sex,age` header
pub fn load_csv(csv_path: &Path) -> Result<Vec<Cat>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;

    let mut cats = Vec::new();
    for result in rdr.deserialize() {
        let cat: Cat = result.context("Failed to deserialize cat")?;
        cats.push(cat);
    }

    Ok(cats)
}

pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    conn.execute(
        "INSERT INTO events (event_id, timestamp, event_type, entity_type, entity_id, data, actor)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            event.data.to_string(),
            event.actor,
        ],
    )?;

    Ok(())
}

/// Events for one entity, oldest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id ASC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp: String = row.get(1)?;
            let data: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
                    })?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

fn cat_from_row(row: &Row<'_>) -> rusqlite::Result<Cat> {
    Ok(Cat {
        name: row.get(0)?,
        sex: row.get(1)?,
        age: row.get(2)?,
    })
}

// ============================================================================
// SQLITE MAPPER
// ============================================================================

/// [`CatMapper`] backed by a SQLite connection
pub struct SqliteCatMapper {
    conn: Connection,
    actor: String,
}

impl SqliteCatMapper {
    /// Wrap an open connection. Call [`setup_database`] first.
    pub fn new(conn: Connection) -> Self {
        SqliteCatMapper {
            conn,
            actor: "cat_service".to_string(),
        }
    }

    /// Open (or create) the database file and make sure the schema exists
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database {:?}", db_path))?;
        setup_database(&conn)?;
        Ok(Self::new(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(Self::new(conn))
    }

    /// Name recorded as the actor of audit events
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cats", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn events_for(&self, name: &str) -> Result<Vec<Event>> {
        get_events_for_entity(&self.conn, "cat", name)
    }

    /// Insert every cat whose name is not stored yet. Returns how many were new.
    pub fn import(&self, cats: &[Cat]) -> Result<usize> {
        let mut inserted = 0;
        let mut duplicates = 0;

        for cat in cats {
            // Row and audit event commit together or not at all
            let tx = self.conn.unchecked_transaction()?;
            let changed = tx.execute(
                "INSERT OR IGNORE INTO cats (name, sex, age) VALUES (?1, ?2, ?3)",
                params![cat.name, cat.sex, cat.age],
            )?;

            if changed == 0 {
                duplicates += 1;
                debug!(name = %cat.name, "skipping duplicate cat");
                continue;
            }

            self.record("cat_imported", cat)?;
            tx.commit()?;
            inserted += 1;
        }

        if duplicates > 0 {
            warn!(duplicates, "duplicate cats skipped during import");
        }

        Ok(inserted)
    }

    fn query(&self, sql: &str, param: &dyn rusqlite::ToSql) -> Result<Vec<Cat>> {
        let mut stmt = self.conn.prepare(sql)?;
        let cats = stmt
            .query_map([param], cat_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cats)
    }

    fn record(&self, event_type: &str, cat: &Cat) -> Result<()> {
        let event = Event::new(
            event_type,
            "cat",
            &cat.name,
            serde_json::to_value(cat)?,
            &self.actor,
        );
        insert_event(&self.conn, &event)
    }
}

impl CatMapper for SqliteCatMapper {
    fn find_all(&self) -> Result<Vec<Cat>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, sex, age FROM cats ORDER BY name")?;
        let cats = stmt
            .query_map([], cat_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cats)
    }

    fn find_by_name(&self, name: &str) -> Result<Vec<Cat>> {
        self.query(
            "SELECT name, sex, age FROM cats WHERE name = ?1 ORDER BY name",
            &name,
        )
    }

    fn find_by_sex(&self, sex: &str) -> Result<Vec<Cat>> {
        self.query(
            "SELECT name, sex, age FROM cats WHERE sex = ?1 ORDER BY name",
            &sex,
        )
    }

    fn find_by_age(&self, age: i32) -> Result<Vec<Cat>> {
        self.query(
            "SELECT name, sex, age FROM cats WHERE age = ?1 ORDER BY name",
            &age,
        )
    }

    fn insert(&self, cat: &Cat) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        match tx.execute(
            "INSERT INTO cats (name, sex, age) VALUES (?1, ?2, ?3)",
            params![cat.name, cat.sex, cat.age],
        ) {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                bail!("cat already exists: {}", cat.name);
            }
            Err(e) => return Err(e.into()),
        }

        self.record("cat_inserted", cat)?;
        tx.commit()?;
        Ok(())
    }

    fn update(&self, cat: &Cat) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE cats SET sex = ?1, age = ?2 WHERE name = ?3",
            params![cat.sex, cat.age, cat.name],
        )?;
        if changed > 0 {
            self.record("cat_updated", cat)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute("DELETE FROM cats WHERE name = ?1", [name])?;
        if changed > 0 {
            let event = Event::new(
                "cat_deleted",
                "cat",
                name,
                serde_json::json!({ "name": name }),
                &self.actor,
            );
            insert_event(&self.conn, &event)?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::CatService;
    use std::io::Write;

    fn seeded_mapper() -> SqliteCatMapper {
        let mapper = SqliteCatMapper::open_in_memory().unwrap();
        mapper.insert(&Cat::new("Omochi", "female", 2)).unwrap();
        mapper.insert(&Cat::new("Coa", "male", 3)).unwrap();
        mapper.insert(&Cat::new("Gonchi", "male", 5)).unwrap();
        mapper
    }

    #[test]
    fn test_lookups_filter_and_order_by_name() {
        let mapper = seeded_mapper();

        let all = mapper.find_all().unwrap();
        let names: Vec<&str> = all.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["Coa", "Gonchi", "Omochi"]);

        assert_eq!(
            mapper.find_by_name("Omochi").unwrap(),
            vec![Cat::new("Omochi", "female", 2)]
        );
        assert_eq!(mapper.find_by_sex("male").unwrap().len(), 2);
        assert_eq!(
            mapper.find_by_age(5).unwrap(),
            vec![Cat::new("Gonchi", "male", 5)]
        );
        assert!(mapper.find_by_name("Tama").unwrap().is_empty());
    }

    #[test]
    fn test_insert_rejects_duplicate_name() {
        let mapper = seeded_mapper();

        let result = mapper.insert(&Cat::new("Omochi", "male", 9));

        let err = result.unwrap_err();
        assert!(err.to_string().contains("cat already exists: Omochi"));
        assert_eq!(mapper.count().unwrap(), 3);
        assert_eq!(mapper.events_for("Omochi").unwrap().len(), 1);
    }

    #[test]
    fn test_failed_event_write_rolls_back_insert() {
        let mapper = SqliteCatMapper::open_in_memory().unwrap();
        mapper.conn.execute("DROP TABLE events", []).unwrap();

        let result = mapper.insert(&Cat::new("Tama", "female", 0));

        assert!(result.is_err());
        assert_eq!(mapper.count().unwrap(), 0, "Cat row should be rolled back");

        let imported = mapper.import(&[Cat::new("Tama", "female", 0)]);
        assert!(imported.is_err());
        assert_eq!(mapper.count().unwrap(), 0);
    }

    #[test]
    fn test_corrupt_event_rows_are_errors() {
        let mapper = seeded_mapper();

        mapper
            .conn
            .execute(
                "UPDATE events SET timestamp = 'garbage' WHERE entity_id = 'Omochi'",
                [],
            )
            .unwrap();
        assert!(mapper.events_for("Omochi").is_err());

        mapper
            .conn
            .execute(
                "UPDATE events SET data = '{not json' WHERE entity_id = 'Coa'",
                [],
            )
            .unwrap();
        assert!(mapper.events_for("Coa").is_err());

        assert_eq!(mapper.events_for("Gonchi").unwrap().len(), 1);
    }

    #[test]
    fn test_update_and_delete_by_name() {
        let mapper = seeded_mapper();

        mapper.update(&Cat::new("Omochi", "female", 4)).unwrap();
        assert_eq!(
            mapper.find_by_name("Omochi").unwrap(),
            vec![Cat::new("Omochi", "female", 4)]
        );

        mapper.delete("Coa").unwrap();
        assert!(mapper.find_by_name("Coa").unwrap().is_empty());
        assert_eq!(mapper.count().unwrap(), 2);
    }

    #[test]
    fn test_mutations_write_audit_events() {
        let mapper = seeded_mapper().with_actor("test_actor");

        mapper.update(&Cat::new("Omochi", "female", 4)).unwrap();
        mapper.delete("Omochi").unwrap();

        let events = mapper.events_for("Omochi").unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["cat_inserted", "cat_updated", "cat_deleted"]);
        assert_eq!(events[1].data["age"], 4);
        assert_eq!(events[2].actor, "test_actor");
    }

    #[test]
    fn test_update_of_missing_cat_writes_no_event() {
        let mapper = SqliteCatMapper::open_in_memory().unwrap();

        mapper.update(&Cat::new("Tama", "female", 1)).unwrap();

        assert!(mapper.events_for("Tama").unwrap().is_empty());
    }

    #[test]
    fn test_import_csv_twice_skips_duplicates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name,sex,age").unwrap();
        writeln!(file, "Omochi,female,2").unwrap();
        writeln!(file, "Coa,male,3").unwrap();
        file.flush().unwrap();

        let cats = load_csv(file.path()).unwrap();
        assert_eq!(cats.len(), 2);

        let mapper = SqliteCatMapper::open_in_memory().unwrap();
        let first = mapper.import(&cats).unwrap();
        let second = mapper.import(&cats).unwrap();

        assert_eq!(first, 2, "First import should insert both cats");
        assert_eq!(second, 0, "Second import should insert nothing");
        assert_eq!(mapper.count().unwrap(), 2);
    }

    #[test]
    fn test_service_over_sqlite() {
        let service = CatService::new(seeded_mapper());

        service.update_cat("Coa", "male", 4).unwrap();
        assert_eq!(
            service.find_cat(None, None, Some(4)).unwrap(),
            vec![Cat::new("Coa", "male", 4)]
        );

        service.delete_cat("Coa").unwrap();
        let err = service.find_cat(Some("Coa"), None, None).unwrap_err();
        assert_eq!(err.to_string(), "Coaという名前のねこは存在しません。");
    }
}
