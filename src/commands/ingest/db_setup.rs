use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::util::{ensure_directory, now_utc_string};

use super::normalize::{NormalizedExercise, NormalizedIngredient};

pub const DB_SCHEMA_VERSION: &str = "0.1.0";

// Longest name/code the application's indexed columns accept.
pub const MAX_KEY_LEN: usize = 191;

pub fn open_store(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }

    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;
    Ok(connection)
}

pub fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

pub fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS "Ingredient" (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              name TEXT NOT NULL UNIQUE CHECK (length(name) <= {max_key}),
              description TEXT NOT NULL DEFAULT '',
              servingSize TEXT NOT NULL DEFAULT '100 g',
              calories REAL NOT NULL DEFAULT 0 CHECK (calories >= 0),
              protein REAL NOT NULL DEFAULT 0 CHECK (protein >= 0),
              carbs REAL NOT NULL DEFAULT 0 CHECK (carbs >= 0),
              fat REAL NOT NULL DEFAULT 0 CHECK (fat >= 0),
              fiber REAL NOT NULL DEFAULT 0 CHECK (fiber >= 0),
              sugar REAL NOT NULL DEFAULT 0 CHECK (sugar >= 0),
              sodium REAL NOT NULL DEFAULT 0 CHECK (sodium >= 0),
              cholesterol REAL NOT NULL DEFAULT 0 CHECK (cholesterol >= 0),
              saturatedFat REAL NOT NULL DEFAULT 0 CHECK (saturatedFat >= 0),
              monounsaturatedFat REAL NOT NULL DEFAULT 0 CHECK (monounsaturatedFat >= 0),
              polyunsaturatedFat REAL NOT NULL DEFAULT 0 CHECK (polyunsaturatedFat >= 0),
              transFat REAL NOT NULL DEFAULT 0 CHECK (transFat >= 0),
              netCarbs REAL NOT NULL DEFAULT 0,
              category TEXT NOT NULL,
              aisle TEXT NOT NULL,
              isActive INTEGER NOT NULL DEFAULT 1,
              source TEXT,
              createdAt TEXT NOT NULL,
              updatedAt TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS "Exercise" (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              activity TEXT NOT NULL,
              code TEXT NOT NULL UNIQUE CHECK (length(code) <= {max_key}),
              met REAL NOT NULL CHECK (met > 0),
              description TEXT NOT NULL DEFAULT '',
              category TEXT NOT NULL,
              intensity TEXT NOT NULL CHECK (intensity IN ('LIGHT', 'MODERATE', 'VIGOROUS')),
              isActive INTEGER NOT NULL DEFAULT 1,
              createdAt TEXT NOT NULL,
              updatedAt TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_ingredient_category ON "Ingredient"(category);
            CREATE INDEX IF NOT EXISTS idx_exercise_category ON "Exercise"(category);
            "#,
            max_key = MAX_KEY_LEN
        ))
        .context("failed to initialize store schema")?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}

pub fn count_rows(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection
        .query_row(sql, [], |row| row.get(0))
        .with_context(|| format!("failed to count rows: {sql}"))?;
    Ok(count)
}

pub fn schema_version(connection: &Connection) -> Option<String> {
    connection
        .query_row(
            "SELECT value FROM metadata WHERE key = 'db_schema_version'",
            [],
            |row| row.get(0),
        )
        .ok()
}

pub trait CanonicalRecord {
    const TABLE: &'static str;

    fn key(&self) -> &str;

    fn exists(connection: &Connection, key: &str) -> rusqlite::Result<bool>;

    fn insert(&self, connection: &Connection, now: &str) -> rusqlite::Result<()>;
}

impl CanonicalRecord for NormalizedIngredient {
    const TABLE: &'static str = "Ingredient";

    fn key(&self) -> &str {
        &self.name
    }

    fn exists(connection: &Connection, key: &str) -> rusqlite::Result<bool> {
        connection
            .prepare_cached(r#"SELECT EXISTS(SELECT 1 FROM "Ingredient" WHERE name = ?1)"#)?
            .query_row([key], |row| row.get(0))
    }

    fn insert(&self, connection: &Connection, now: &str) -> rusqlite::Result<()> {
        let n = &self.nutrition;
        connection
            .prepare_cached(
                r#"
                INSERT INTO "Ingredient"(
                  name, description, servingSize,
                  calories, protein, carbs, fat, fiber, sugar, sodium, cholesterol,
                  saturatedFat, monounsaturatedFat, polyunsaturatedFat, transFat,
                  netCarbs, category, aisle, isActive, source, createdAt, updatedAt
                )
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?21)
                "#,
            )?
            .execute(params![
                self.name,
                self.description,
                self.serving_size,
                n.calories,
                n.protein,
                n.carbs,
                n.fat,
                n.fiber,
                n.sugar,
                n.sodium,
                n.cholesterol,
                n.saturated_fat,
                n.monounsaturated_fat,
                n.polyunsaturated_fat,
                n.trans_fat,
                self.net_carbs,
                self.category,
                self.aisle,
                self.is_active,
                self.source.as_str(),
                now,
            ])?;
        Ok(())
    }
}

impl CanonicalRecord for NormalizedExercise {
    const TABLE: &'static str = "Exercise";

    fn key(&self) -> &str {
        &self.code
    }

    fn exists(connection: &Connection, key: &str) -> rusqlite::Result<bool> {
        connection
            .prepare_cached(r#"SELECT EXISTS(SELECT 1 FROM "Exercise" WHERE code = ?1)"#)?
            .query_row([key], |row| row.get(0))
    }

    fn insert(&self, connection: &Connection, now: &str) -> rusqlite::Result<()> {
        connection
            .prepare_cached(
                r#"
                INSERT INTO "Exercise"(
                  activity, code, met, description, category, intensity, isActive, createdAt, updatedAt
                )
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                "#,
            )?
            .execute(params![
                self.activity,
                self.code,
                self.met,
                self.description,
                self.category,
                self.intensity.as_str(),
                self.is_active,
                now,
            ])?;
        Ok(())
    }
}
