//! Visit persistence.
//!
//! Every operation opens its own connection and closes it before returning.
//! Nothing is pooled or shared between requests; an early return drops the
//! connection, which closes it.

use std::path::Path;
use std::str::FromStr;

use sqlx::migrate::MigrateError;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};

use crate::models::{NewVisit, Visit};

const SELECT_VISITS: &str = r#"
    SELECT id, name, comment, image_url, public_id, created_at
    FROM visits
    ORDER BY created_at DESC, id DESC
"#;

const INSERT_VISIT_PG: &str = r#"
    INSERT INTO visits (name, comment, image_url, public_id)
    VALUES ($1, $2, $3, $4)
    RETURNING id, name, comment, image_url, public_id, created_at
"#;

const INSERT_VISIT_SQLITE: &str = r#"
    INSERT INTO visits (name, comment, image_url, public_id)
    VALUES (?, ?, ?, ?)
    RETURNING id, name, comment, image_url, public_id, created_at
"#;

/// Connect options for the relational store. The URL scheme picks the driver:
/// `postgres://` in production, `sqlite:` for local runs and tests.
#[derive(Debug, Clone)]
pub enum Database {
    Postgres(PgConnectOptions),
    Sqlite(SqliteConnectOptions),
}

impl Database {
    pub fn from_url(database_url: &str) -> Result<Self, sqlx::Error> {
        if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
            return Ok(Self::Postgres(PgConnectOptions::from_str(database_url)?));
        }

        if let Some(rest) = database_url.strip_prefix("sqlite:") {
            let rest = rest.trim_start_matches("//");
            let (path, query) = rest.split_once('?').unwrap_or((rest, ""));

            // Each operation opens its own connection, so an in-memory
            // database would vanish right after the migration connection.
            let in_memory = path.is_empty()
                || path == ":memory:"
                || query.split('&').any(|param| param == "mode=memory");
            if in_memory {
                return Err(sqlx::Error::Configuration(
                    "in-memory sqlite is not supported: DATABASE_URL must name a database file"
                        .into(),
                ));
            }

            // Ensure data directory exists
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent).ok();
            }

            let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
            return Ok(Self::Sqlite(options));
        }

        Err(sqlx::Error::Configuration(
            "DATABASE_URL must start with postgres://, postgresql:// or sqlite:".into(),
        ))
    }

    /// Create the `visits` table if it does not exist yet.
    pub async fn migrate(&self) -> Result<(), MigrateError> {
        match self {
            Self::Postgres(options) => {
                let mut conn = options.connect().await?;
                sqlx::migrate!("./migrations/postgres").run(&mut conn).await?;
                conn.close().await?;
            }
            Self::Sqlite(options) => {
                let mut conn = options.connect().await?;
                sqlx::migrate!("./migrations/sqlite").run(&mut conn).await?;
                conn.close().await?;
            }
        }
        Ok(())
    }

    /// Insert one visit inside a transaction and return the stored row.
    /// On failure the transaction is rolled back before the error is returned.
    pub async fn insert_visit(&self, visit: &NewVisit) -> Result<Visit, sqlx::Error> {
        match self {
            Self::Postgres(options) => {
                let mut conn = options.connect().await?;
                let inserted = insert_pg(&mut conn, visit).await;
                finish(conn.close().await);
                inserted
            }
            Self::Sqlite(options) => {
                let mut conn = options.connect().await?;
                let inserted = insert_sqlite(&mut conn, visit).await;
                finish(conn.close().await);
                inserted
            }
        }
    }

    /// All visits, newest first.
    pub async fn list_visits(&self) -> Result<Vec<Visit>, sqlx::Error> {
        match self {
            Self::Postgres(options) => {
                let mut conn = options.connect().await?;
                let visits = sqlx::query_as::<_, Visit>(SELECT_VISITS)
                    .fetch_all(&mut conn)
                    .await;
                finish(conn.close().await);
                visits
            }
            Self::Sqlite(options) => {
                let mut conn = options.connect().await?;
                let visits = sqlx::query_as::<_, Visit>(SELECT_VISITS)
                    .fetch_all(&mut conn)
                    .await;
                finish(conn.close().await);
                visits
            }
        }
    }
}

async fn insert_pg(conn: &mut PgConnection, visit: &NewVisit) -> Result<Visit, sqlx::Error> {
    let mut tx = conn.begin().await?;

    let inserted = sqlx::query_as::<_, Visit>(INSERT_VISIT_PG)
        .bind(&visit.name)
        .bind(&visit.comment)
        .bind(&visit.image_url)
        .bind(&visit.public_id)
        .fetch_one(&mut *tx)
        .await;

    match inserted {
        Ok(row) => {
            tx.commit().await?;
            Ok(row)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::error!("Rollback failed: {rollback}");
            }
            Err(e)
        }
    }
}

async fn insert_sqlite(conn: &mut SqliteConnection, visit: &NewVisit) -> Result<Visit, sqlx::Error> {
    let mut tx = conn.begin().await?;

    let inserted = sqlx::query_as::<_, Visit>(INSERT_VISIT_SQLITE)
        .bind(&visit.name)
        .bind(&visit.comment)
        .bind(&visit.image_url)
        .bind(&visit.public_id)
        .fetch_one(&mut *tx)
        .await;

    match inserted {
        Ok(row) => {
            tx.commit().await?;
            Ok(row)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::error!("Rollback failed: {rollback}");
            }
            Err(e)
        }
    }
}

// A failed close after the work is done is not worth failing the request.
fn finish(closed: Result<(), sqlx::Error>) {
    if let Err(e) = closed {
        tracing::warn!("Failed to close database connection: {e}");
    }
}
