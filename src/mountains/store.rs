//! SQLite-backed mountain table

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rusqlite::{Connection, Row, params};
use tracing::{debug, info, instrument};

use super::{Mountain, MountainMatch, MountainSearch};
use crate::Result;
use crate::error::PowderError;
use crate::geo::{Point, haversine_km, round_to};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS mountains (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    state TEXT NOT NULL,
    lat REAL NOT NULL,
    lon REAL NOT NULL,
    vertical_drop INTEGER,
    base_elevation INTEGER,
    summit_elevation INTEGER,
    num_trails INTEGER,
    num_lifts INTEGER,
    green_pct INTEGER,
    blue_pct INTEGER,
    black_pct INTEGER,
    double_black_pct INTEGER,
    terrain_parks TEXT,
    glades TEXT,
    pass_types TEXT,
    allows_snowboarding INTEGER NOT NULL DEFAULT 1,
    lift_types TEXT,
    has_night_skiing INTEGER NOT NULL DEFAULT 0,
    has_magic_carpet INTEGER NOT NULL DEFAULT 0,
    learning_area_quality TEXT,
    snowmaking_pct INTEGER,
    avg_weekday_price INTEGER,
    avg_weekend_price INTEGER,
    website TEXT
);
CREATE INDEX IF NOT EXISTS idx_mountains_name ON mountains (name);
";

const COLUMNS: &str = "id, name, state, lat, lon, vertical_drop, base_elevation, summit_elevation, \
    num_trails, num_lifts, green_pct, blue_pct, black_pct, double_black_pct, terrain_parks, glades, \
    pass_types, allows_snowboarding, lift_types, has_night_skiing, has_magic_carpet, \
    learning_area_quality, snowmaking_pct, avg_weekday_price, avg_weekend_price, website";

/// Mountain database connection wrapper
pub struct MountainStore {
    conn: Connection,
}

impl MountainStore {
    /// Open (or create) a database file and ensure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = MountainStore { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory database (for tests and evals)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = MountainStore { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Replace every row with `mountains` in a single transaction
    #[instrument(skip_all, fields(count = mountains.len()))]
    pub fn seed(&mut self, mountains: &[Mountain]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM mountains", [])?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO mountains ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, \
                 ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)"
            ))?;
            for m in mountains {
                let id = (m.id > 0).then_some(m.id);
                insert.execute(params![
                    id,
                    m.name,
                    m.state,
                    m.lat,
                    m.lon,
                    m.vertical_drop,
                    m.base_elevation,
                    m.summit_elevation,
                    m.num_trails,
                    m.num_lifts,
                    m.green_pct,
                    m.blue_pct,
                    m.black_pct,
                    m.double_black_pct,
                    m.terrain_parks,
                    m.glades,
                    m.pass_types,
                    m.allows_snowboarding,
                    m.lift_types,
                    m.has_night_skiing,
                    m.has_magic_carpet,
                    m.learning_area_quality,
                    m.snowmaking_pct,
                    m.avg_weekday_price,
                    m.avg_weekend_price,
                    m.website,
                ])?;
            }
        }
        tx.commit()?;
        info!(count = mountains.len(), "Seeded mountain database");
        Ok(mountains.len())
    }

    /// Read mountains from a JSON-lines file, skipping blank lines
    pub fn load_jsonl(path: &Path) -> Result<Vec<Mountain>> {
        let reader = BufReader::new(File::open(path)?);
        let mut mountains = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mountain: Mountain = serde_json::from_str(&line).map_err(|e| {
                PowderError::validation(format!(
                    "{}:{}: invalid mountain record: {e}",
                    path.display(),
                    line_no + 1
                ))
            })?;
            mountains.push(mountain);
        }
        Ok(mountains)
    }

    /// Open the database, seeding it from `jsonl_path` when it is empty
    pub fn open_or_seed(db_path: &Path, jsonl_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut store = Self::open(db_path)?;
        if store.count()? == 0 {
            if !jsonl_path.exists() {
                return Err(PowderError::not_found(format!(
                    "Mountain database {} is empty and seed file {} does not exist",
                    db_path.display(),
                    jsonl_path.display()
                )));
            }
            let mountains = Self::load_jsonl(jsonl_path)?;
            store.seed(&mountains)?;
        }
        Ok(store)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM mountains", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn all(&self) -> Result<Vec<Mountain>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {COLUMNS} FROM mountains ORDER BY name"))?;
        let rows = stmt.query_map([], row_to_mountain)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Case-insensitive exact name lookup
    pub fn find_by_name(&self, name: &str) -> Result<Option<Mountain>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM mountains WHERE lower(name) = lower(?1) LIMIT 1"
        ))?;
        let mut rows = stmt.query_map([name.trim()], row_to_mountain)?;
        Ok(rows.next().transpose()?)
    }

    /// Closest mountain to `point`, if the table has any rows
    pub fn nearest(&self, point: Point) -> Result<Option<Mountain>> {
        Ok(self
            .all()?
            .into_iter()
            .map(|mountain| (haversine_km(point, mountain.point()), mountain))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, mountain)| mountain))
    }

    /// Mountains within `max_distance_km` of the origin that pass every set
    /// filter, nearest first
    #[instrument(skip(self), level = "debug")]
    pub fn search(&self, search: &MountainSearch) -> Result<Vec<MountainMatch>> {
        let mut matches: Vec<MountainMatch> = self
            .all()?
            .into_iter()
            .filter(|mountain| search.matches(mountain))
            .filter_map(|mountain| {
                let distance = haversine_km(search.origin, mountain.point());
                (distance <= search.max_distance_km).then(|| MountainMatch {
                    mountain,
                    distance_km: round_to(distance, 1),
                })
            })
            .collect();
        matches.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));

        debug!(found = matches.len(), "Mountain search complete");
        Ok(matches)
    }
}

fn row_to_mountain(row: &Row<'_>) -> rusqlite::Result<Mountain> {
    Ok(Mountain {
        id: row.get("id")?,
        name: row.get("name")?,
        state: row.get("state")?,
        lat: row.get("lat")?,
        lon: row.get("lon")?,
        vertical_drop: row.get("vertical_drop")?,
        base_elevation: row.get("base_elevation")?,
        summit_elevation: row.get("summit_elevation")?,
        num_trails: row.get("num_trails")?,
        num_lifts: row.get("num_lifts")?,
        green_pct: row.get("green_pct")?,
        blue_pct: row.get("blue_pct")?,
        black_pct: row.get("black_pct")?,
        double_black_pct: row.get("double_black_pct")?,
        terrain_parks: row.get("terrain_parks")?,
        glades: row.get("glades")?,
        pass_types: row.get("pass_types")?,
        allows_snowboarding: row.get("allows_snowboarding")?,
        lift_types: row.get("lift_types")?,
        has_night_skiing: row.get("has_night_skiing")?,
        has_magic_carpet: row.get("has_magic_carpet")?,
        learning_area_quality: row.get("learning_area_quality")?,
        snowmaking_pct: row.get("snowmaking_pct")?,
        avg_weekday_price: row.get("avg_weekday_price")?,
        avg_weekend_price: row.get("avg_weekend_price")?,
        website: row.get("website")?,
    })
}
