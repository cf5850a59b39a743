// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PostgreSQL + pgvector backend.
//!
//! One table per collection. Each call opens its own connection, runs inside one
//! transaction and closes the connection again; nothing is held between calls.
//! Scores are `1 - cosine_distance`, matching the local backend.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgRow};
use sqlx::{Connection, PgConnection, Row};
use tracing::{debug, error, info};

use mnemos_config::model::{DbConfig, PgIndexType, PgVectorConfig, RemoteVectorStoreConfig};
use mnemos_core::traits::index::check_add_shape;
use mnemos_core::{
    AdapterType, HealthStatus, Metadata, MnemosError, PluginAdapter, Record, RecordId, SearchHit,
    Vector, VectorIndexAdapter,
};

/// Point-in-time description of a pgvector table.
#[derive(Debug, Clone, PartialEq)]
pub struct PgStoreStats {
    pub table: String,
    pub records: usize,
    pub dimension: usize,
    pub index_type: PgIndexType,
}

/// [`VectorIndexAdapter`] over a pgvector table.
pub struct PgVectorStore {
    table: String,
    options: PgConnectOptions,
    connect_timeout: Duration,
    query_timeout: Duration,
    vector: PgVectorConfig,
}

impl std::fmt::Debug for PgVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgVectorStore")
            .field("table", &self.table)
            .field("dimension", &self.vector.dimension)
            .field("index_type", &self.vector.index_type)
            .finish_non_exhaustive()
    }
}

impl PgVectorStore {
    /// Validates `table`, then creates the extension, table, update trigger and
    /// similarity index if they do not exist yet.
    pub async fn connect(
        config: &RemoteVectorStoreConfig,
        table: &str,
    ) -> Result<Self, MnemosError> {
        validate_table_name(table)?;
        if config.vector_config.dimension == 0 {
            return Err(MnemosError::Config(
                "vector_store.remote.vector_config.dimension must be at least 1".into(),
            ));
        }

        let store = Self {
            table: table.to_string(),
            options: connect_options(&config.db_config),
            connect_timeout: Duration::from_secs(config.db_config.connect_timeout_secs),
            query_timeout: Duration::from_secs(config.db_config.query_timeout_secs),
            vector: config.vector_config.clone(),
        };

        let statements = schema_statements(table, &store.vector);
        store
            .run("create schema", async {
                let mut conn = store.open().await?;
                let mut tx = conn.begin().await?;
                for sql in &statements {
                    sqlx::query(sql).execute(&mut *tx).await?;
                }
                tx.commit().await?;
                conn.close().await
            })
            .await?;

        info!(
            table,
            host = %config.db_config.host,
            dimension = store.vector.dimension,
            index_type = ?store.vector.index_type,
            "pgvector store ready"
        );
        Ok(store)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub async fn stats(&self) -> Result<PgStoreStats, MnemosError> {
        Ok(PgStoreStats {
            table: self.table.clone(),
            records: self.count().await?,
            dimension: self.vector.dimension,
            index_type: self.vector.index_type,
        })
    }

    async fn open(&self) -> Result<PgConnection, sqlx::Error> {
        match tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&self.options))
            .await
        {
            Ok(conn) => conn,
            Err(_) => Err(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect timed out after {:?}", self.connect_timeout),
            ))),
        }
    }

    /// Applies the query timeout and maps failures, logging them on the way out.
    async fn run<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, sqlx::Error>>,
    ) -> Result<T, MnemosError> {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(table = %self.table, op, error = %e, "pgvector call failed");
                Err(MnemosError::backend(format!("pgvector {op} on {} failed", self.table), e))
            }
            Err(_) => {
                error!(table = %self.table, op, timeout = ?self.query_timeout, "pgvector call timed out");
                Err(MnemosError::Timeout {
                    duration: self.query_timeout,
                })
            }
        }
    }

    fn check_dimension(&self, actual: usize) -> Result<(), MnemosError> {
        if actual != self.vector.dimension {
            return Err(MnemosError::DimensionMismatch {
                expected: self.vector.dimension,
                actual,
            });
        }
        Ok(())
    }

    /// `SET LOCAL` statement tuning the similarity index for one transaction.
    fn search_tuning(&self) -> String {
        match self.vector.index_type {
            PgIndexType::Hnsw => format!("SET LOCAL hnsw.ef_search = {}", self.vector.ef_search),
            PgIndexType::Ivfflat => format!("SET LOCAL ivfflat.probes = {}", self.vector.probes),
        }
    }
}

#[async_trait]
impl PluginAdapter for PgVectorStore {
    fn name(&self) -> &str {
        &self.table
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::VectorIndex
    }

    async fn health_check(&self) -> Result<HealthStatus, MnemosError> {
        let probe = self
            .run("health check", async {
                let mut conn = self.open().await?;
                let one: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&mut conn).await?;
                conn.close().await?;
                Ok(one)
            })
            .await;
        Ok(match probe {
            Ok(1) => HealthStatus::Healthy,
            Ok(other) => HealthStatus::Degraded(format!("SELECT 1 returned {other}")),
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), MnemosError> {
        Ok(())
    }
}

#[async_trait]
impl VectorIndexAdapter for PgVectorStore {
    async fn add(
        &self,
        vectors: Vec<Vector>,
        texts: Vec<String>,
        metadatas: Option<Vec<Metadata>>,
    ) -> Result<Vec<RecordId>, MnemosError> {
        let dim = check_add_shape(&vectors, &texts, metadatas.as_deref())?;
        if vectors.is_empty() {
            return Ok(Vec::new());
        }
        self.check_dimension(dim)?;

        let metadatas = metadatas.unwrap_or_else(|| vec![Metadata::new(); vectors.len()]);
        let ids: Vec<RecordId> = (0..vectors.len())
            .map(|_| uuid::Uuid::new_v4().to_string())
            .collect();
        let sql = format!(
            "INSERT INTO {} (id, vector, text, metadata, created_at, updated_at) \
             VALUES ($1, $2::text::vector, $3, $4, clock_timestamp(), clock_timestamp())",
            self.table
        );

        self.run("add", async {
            let mut conn = self.open().await?;
            let mut tx = conn.begin().await?;
            for (((id, vector), text), metadata) in
                ids.iter().zip(&vectors).zip(&texts).zip(&metadatas)
            {
                sqlx::query(&sql)
                    .bind(id)
                    .bind(vector_literal(vector))
                    .bind(text)
                    .bind(serde_json::Value::Object(metadata.clone()))
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            conn.close().await
        })
        .await?;

        metrics::counter!("mnemos_vector_adds_total", "backend" => "pgvector")
            .increment(ids.len() as u64);
        debug!(table = %self.table, added = ids.len(), "records added");
        Ok(ids)
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>, MnemosError> {
        self.check_dimension(query.len())?;
        if top_k == 0 {
            return Ok(Vec::new());
        }
        metrics::counter!("mnemos_vector_searches_total", "backend" => "pgvector").increment(1);

        let tuning = self.search_tuning();
        let sql = format!(
            "SELECT id, text, metadata, 1 - (vector <=> $1::text::vector) AS score \
             FROM {t} \
             WHERE 1 - (vector <=> $1::text::vector) >= $2 \
             ORDER BY vector <=> $1::text::vector, created_at, id \
             LIMIT $3",
            t = self.table
        );
        let literal = vector_literal(query);
        let limit = i64::try_from(top_k).unwrap_or(i64::MAX);

        let rows = self
            .run("search", async {
                let mut conn = self.open().await?;
                let mut tx = conn.begin().await?;
                sqlx::query(&tuning).execute(&mut *tx).await?;
                let rows = sqlx::query(&sql)
                    .bind(&literal)
                    .bind(f64::from(threshold))
                    .bind(limit)
                    .fetch_all(&mut *tx)
                    .await?;
                tx.commit().await?;
                conn.close().await?;
                Ok(rows)
            })
            .await?;

        rows.iter().map(row_to_hit).collect()
    }

    async fn update(
        &self,
        id: &str,
        vector: Vector,
        text: String,
        metadata: Option<Metadata>,
    ) -> Result<bool, MnemosError> {
        self.check_dimension(vector.len())?;
        let sql = format!(
            "UPDATE {} SET vector = $2::text::vector, text = $3, \
             metadata = COALESCE($4::jsonb, metadata), updated_at = CURRENT_TIMESTAMP \
             WHERE id = $1",
            self.table
        );
        let literal = vector_literal(&vector);
        let metadata = metadata.map(serde_json::Value::Object);

        let affected = self
            .run("update", async {
                let mut conn = self.open().await?;
                let mut tx = conn.begin().await?;
                let result = sqlx::query(&sql)
                    .bind(id)
                    .bind(&literal)
                    .bind(&text)
                    .bind(&metadata)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                conn.close().await?;
                Ok(result.rows_affected())
            })
            .await?;
        Ok(affected > 0)
    }

    async fn delete_by_ids(&self, ids: &[RecordId]) -> Result<bool, MnemosError> {
        if ids.is_empty() {
            return Ok(true);
        }
        let sql = format!("DELETE FROM {} WHERE id = ANY($1)", self.table);
        let removed = self
            .run("delete", async {
                let mut conn = self.open().await?;
                let mut tx = conn.begin().await?;
                let result = sqlx::query(&sql).bind(ids).execute(&mut *tx).await?;
                tx.commit().await?;
                conn.close().await?;
                Ok(result.rows_affected())
            })
            .await?;
        debug!(table = %self.table, removed, "records deleted");
        Ok(true)
    }

    async fn get(&self, id: &str) -> Result<Option<Record>, MnemosError> {
        let sql = format!(
            "SELECT id, vector::text AS vector, text, metadata, created_at FROM {} WHERE id = $1",
            self.table
        );
        let row = self
            .run("get", async {
                let mut conn = self.open().await?;
                let row = sqlx::query(&sql).bind(id).fetch_optional(&mut conn).await?;
                conn.close().await?;
                Ok(row)
            })
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn count(&self) -> Result<usize, MnemosError> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let n: i64 = self
            .run("count", async {
                let mut conn = self.open().await?;
                let n: i64 = sqlx::query_scalar(&sql).fetch_one(&mut conn).await?;
                conn.close().await?;
                Ok(n)
            })
            .await?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    async fn clear(&self) -> Result<bool, MnemosError> {
        let sql = format!("DELETE FROM {}", self.table);
        self.run("clear", async {
            let mut conn = self.open().await?;
            let mut tx = conn.begin().await?;
            sqlx::query(&sql).execute(&mut *tx).await?;
            tx.commit().await?;
            conn.close().await
        })
        .await?;
        info!(table = %self.table, "pgvector table cleared");
        Ok(true)
    }

    async fn dimension(&self) -> usize {
        self.vector.dimension
    }
}

fn connect_options(db: &DbConfig) -> PgConnectOptions {
    let options = PgConnectOptions::new()
        .host(&db.host)
        .port(db.port)
        .database(&db.database)
        .username(&db.user);
    match &db.password {
        Some(password) => options.password(password),
        None => options,
    }
}

fn decode_err(column: &str, message: impl std::fmt::Display) -> MnemosError {
    MnemosError::Internal(format!("unexpected value in column {column}: {message}"))
}

fn row_metadata(row: &PgRow) -> Result<Metadata, MnemosError> {
    let value: serde_json::Value = row
        .try_get("metadata")
        .map_err(|e| decode_err("metadata", e))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        serde_json::Value::Null => Ok(Metadata::new()),
        other => Err(decode_err("metadata", format!("not an object: {other}"))),
    }
}

fn row_to_hit(row: &PgRow) -> Result<SearchHit, MnemosError> {
    let score: f64 = row.try_get("score").map_err(|e| decode_err("score", e))?;
    Ok(SearchHit {
        id: row.try_get("id").map_err(|e| decode_err("id", e))?,
        text: row.try_get("text").map_err(|e| decode_err("text", e))?,
        score: score as f32,
        metadata: row_metadata(row)?,
    })
}

fn row_to_record(row: &PgRow) -> Result<Record, MnemosError> {
    let vector: String = row.try_get("vector").map_err(|e| decode_err("vector", e))?;
    let created_at: DateTime<Utc> = row
        .try_get("created_at")
        .map_err(|e| decode_err("created_at", e))?;
    Ok(Record {
        id: row.try_get("id").map_err(|e| decode_err("id", e))?,
        vector: parse_vector_literal(&vector)?,
        text: row.try_get("text").map_err(|e| decode_err("text", e))?,
        metadata: row_metadata(row)?,
        created_at,
    })
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`; anything else would be unsafe to interpolate.
pub fn validate_table_name(name: &str) -> Result<(), MnemosError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(MnemosError::InvalidInput(format!(
            "invalid table name {name:?}: expected [A-Za-z_][A-Za-z0-9_]*"
        )))
    }
}

/// pgvector text form: `[0.1,0.2,0.3]`.
pub fn vector_literal(v: &[f32]) -> String {
    let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
    format!("[{}]", parts.join(","))
}

pub fn parse_vector_literal(s: &str) -> Result<Vector, MnemosError> {
    let inner = s
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| decode_err("vector", format!("{s:?} is not a vector literal")))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| decode_err("vector", e))
        })
        .collect()
}

/// DDL for the similarity index over the `vector` column.
pub fn index_ddl(table: &str, config: &PgVectorConfig) -> String {
    match config.index_type {
        PgIndexType::Ivfflat => format!(
            "CREATE INDEX IF NOT EXISTS {table}_vector_idx ON {table} \
             USING ivfflat (vector vector_cosine_ops) WITH (lists = {})",
            config.lists
        ),
        PgIndexType::Hnsw => format!(
            "CREATE INDEX IF NOT EXISTS {table}_vector_idx ON {table} \
             USING hnsw (vector vector_cosine_ops) WITH (m = {}, ef_construction = {})",
            config.m, config.ef_construction
        ),
    }
}

/// Statements run once at connect, in order.
pub fn schema_statements(table: &str, config: &PgVectorConfig) -> Vec<String> {
    vec![
        "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             id VARCHAR(50) PRIMARY KEY, \
             vector vector({dim}) NOT NULL, \
             text TEXT NOT NULL, \
             metadata JSONB NOT NULL DEFAULT '{{}}', \
             created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP, \
             updated_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP)",
            dim = config.dimension
        ),
        "CREATE OR REPLACE FUNCTION mnemos_touch_updated_at() RETURNS TRIGGER AS $$ \
         BEGIN NEW.updated_at = CURRENT_TIMESTAMP; RETURN NEW; END; \
         $$ LANGUAGE plpgsql"
            .to_string(),
        format!("DROP TRIGGER IF EXISTS {table}_touch_updated_at ON {table}"),
        format!(
            "CREATE TRIGGER {table}_touch_updated_at BEFORE UPDATE ON {table} \
             FOR EACH ROW EXECUTE FUNCTION mnemos_touch_updated_at()"
        ),
        index_ddl(table, config),
    ]
}
