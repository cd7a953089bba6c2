//! PostgreSQL document store with pgvector similarity search
//!
//! Each logical database maps to a schema holding a `containers` catalog and one
//! table per container. Documents are kept as JSONB; a container with a vector
//! index gets an extra `halfvec` column with an HNSW cosine index.

use std::collections::HashMap;
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use crate::domain::store::{
    validate_identifier, ContainerSpec, DocumentQuery, DocumentStore, QueryHit, QueryOrder,
    SortDirection, VectorIndexKind,
};
use crate::domain::DomainError;

/// PostgreSQL store configuration
#[derive(Clone)]
pub struct PostgresStoreConfig {
    /// Connection URL
    pub url: String,
    /// Password applied on top of the URL, if set
    pub key: Option<String>,
    /// Schema that holds the containers
    pub db_name: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Debug for PostgresStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStoreConfig")
            .field("url", &self.url)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("db_name", &self.db_name)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl Default for PostgresStoreConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/convo_cache".to_string(),
            key: None,
            db_name: "convo_cache".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}

impl PostgresStoreConfig {
    pub fn new(url: impl Into<String>, db_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            db_name: db_name.into(),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }
}

/// Document store backed by PostgreSQL
pub struct PostgresDocumentStore {
    pool: PgPool,
    schema: String,
    containers: RwLock<HashMap<String, ContainerSpec>>,
}

impl Debug for PostgresDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDocumentStore")
            .field("schema", &self.schema)
            .finish()
    }
}

impl PostgresDocumentStore {
    /// Connect and make sure the schema and its catalog exist
    pub async fn connect(config: &PostgresStoreConfig) -> Result<Self, DomainError> {
        validate_identifier(&config.db_name)?;

        let mut options = PgConnectOptions::from_str(&config.url).map_err(|e| {
            DomainError::configuration(format!("Invalid database URL: {}", e))
        })?;

        if let Some(ref key) = config.key {
            options = options.password(key);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to connect to PostgreSQL: {}", e)))?;

        let store = Self {
            pool,
            schema: config.db_name.clone(),
            containers: RwLock::new(HashMap::new()),
        };

        if let Err(e) = store.ensure_schema().await {
            store.pool.close().await;
            return Err(e);
        }

        info!(schema = %store.schema, "Connected to PostgreSQL document store");

        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), DomainError> {
        self.execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema))
            .await?;

        self.execute(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {}.containers (
                name TEXT PRIMARY KEY,
                partition_key_path TEXT NOT NULL,
                throughput INTEGER NOT NULL,
                default_ttl_secs DOUBLE PRECISION,
                vector_index JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            self.schema
        ))
        .await
    }

    async fn execute(&self, sql: &str) -> Result<(), DomainError> {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to execute statement: {}", e)))?;
        Ok(())
    }

    fn table(&self, container: &str) -> String {
        format!("{}.{}", self.schema, container)
    }

    fn spec(&self, container: &str) -> Result<ContainerSpec, DomainError> {
        self.containers
            .read()
            .map_err(|e| DomainError::storage(format!("Lock error: {}", e)))?
            .get(container)
            .cloned()
            .ok_or_else(|| {
                DomainError::not_found(format!("Container '{}' is not provisioned", container))
            })
    }
}

/// Render a vector as a pgvector literal
fn vector_literal(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// Predicate that keeps only documents inside the container's TTL
fn live_clause(spec: &ContainerSpec) -> String {
    match spec.default_ttl {
        Some(ttl) => format!(
            "updated_at > NOW() - make_interval(secs => {})",
            ttl.as_secs_f64()
        ),
        None => "TRUE".to_string(),
    }
}

fn create_table_sql(table: &str, spec: &ContainerSpec) -> String {
    let embedding_column = spec
        .vector_index
        .as_ref()
        .map(|index| format!("embedding halfvec({}),", index.dimensions))
        .unwrap_or_default();

    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id TEXT NOT NULL,
            partition_key TEXT NOT NULL,
            data JSONB NOT NULL,
            {}
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (partition_key, id)
        )
        "#,
        table, embedding_column
    )
}

fn vector_index_sql(table: &str, spec: &ContainerSpec) -> Option<String> {
    let index = spec.vector_index.as_ref()?;

    match index.kind {
        VectorIndexKind::QuantizedFlat => Some(format!(
            "CREATE INDEX IF NOT EXISTS {}_embedding_idx ON {} USING hnsw (embedding halfvec_cosine_ops)",
            spec.name, table
        )),
        VectorIndexKind::Flat => None,
    }
}

fn upsert_sql(table: &str, vector: Option<&[f32]>) -> String {
    match vector {
        Some(vector) => format!(
            r#"
            INSERT INTO {} (id, partition_key, data, embedding, updated_at)
            VALUES ($1, $2, $3::jsonb, '{}'::halfvec, NOW())
            ON CONFLICT (partition_key, id)
            DO UPDATE SET data = EXCLUDED.data, embedding = EXCLUDED.embedding, updated_at = NOW()
            "#,
            table,
            vector_literal(vector)
        ),
        None => format!(
            r#"
            INSERT INTO {} (id, partition_key, data, updated_at)
            VALUES ($1, $2, $3::jsonb, NOW())
            ON CONFLICT (partition_key, id)
            DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
            "#,
            table
        ),
    }
}

/// Build a SELECT for a query, returning the SQL and the JSON-text filter binds
fn select_sql(
    table: &str,
    spec: &ContainerSpec,
    query: &DocumentQuery,
) -> Result<(String, Vec<String>), DomainError> {
    let mut conditions = vec![live_clause(spec)];
    let mut binds = Vec::with_capacity(query.filters.len());

    for filter in &query.filters {
        validate_identifier(&filter.field)?;
        binds.push(filter.value.to_string());
        conditions.push(format!("data->'{}' = ${}::jsonb", filter.field, binds.len()));
    }

    let (similarity, order) = match query.order {
        Some(QueryOrder::VectorDistance {
            ref field,
            ref vector,
        }) => {
            let indexed = spec
                .vector_index
                .as_ref()
                .is_some_and(|index| &index.path == field);

            if !indexed {
                return Err(DomainError::validation(format!(
                    "Container '{}' has no vector index on '{}'",
                    spec.name, field
                )));
            }

            let distance = format!("embedding <=> '{}'::halfvec", vector_literal(vector));
            conditions.push("embedding IS NOT NULL".to_string());

            (
                format!("1 - ({}) AS similarity", distance),
                format!(" ORDER BY {}, id", distance),
            )
        }
        Some(QueryOrder::Field {
            ref field,
            direction,
        }) => {
            validate_identifier(field)?;
            let direction = match direction {
                SortDirection::Ascending => "ASC",
                SortDirection::Descending => "DESC",
            };

            (
                "NULL::float8 AS similarity".to_string(),
                format!(" ORDER BY data->'{}' {}, id", field, direction),
            )
        }
        None => ("NULL::float8 AS similarity".to_string(), String::new()),
    };

    let limit = query
        .top
        .map(|top| format!(" LIMIT {}", top))
        .unwrap_or_default();

    let sql = format!(
        "SELECT data, {} FROM {} WHERE {}{}{}",
        similarity,
        table,
        conditions.join(" AND "),
        order,
        limit
    );

    Ok((sql, binds))
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn ensure_container(&self, spec: &ContainerSpec) -> Result<(), DomainError> {
        spec.validate()?;
        let table = self.table(&spec.name);

        if spec.vector_index.is_some() {
            self.execute("CREATE EXTENSION IF NOT EXISTS vector").await?;
        }

        self.execute(&create_table_sql(&table, spec)).await?;
        self.execute(&format!(
            "CREATE INDEX IF NOT EXISTS {}_updated_at_idx ON {} (updated_at)",
            spec.name, table
        ))
        .await?;

        if let Some(sql) = vector_index_sql(&table, spec) {
            self.execute(&sql).await?;
        }

        let vector_index = spec
            .vector_index
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| DomainError::internal(format!("Failed to encode vector index: {}", e)))?;

        let catalog = format!(
            r#"
            INSERT INTO {}.containers (name, partition_key_path, throughput, default_ttl_secs, vector_index)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO UPDATE
            SET throughput = EXCLUDED.throughput, default_ttl_secs = EXCLUDED.default_ttl_secs
            "#,
            self.schema
        );

        sqlx::query(&catalog)
            .bind(&spec.name)
            .bind(&spec.partition_key_path)
            .bind(spec.throughput as i32)
            .bind(spec.default_ttl.map(|ttl| ttl.as_secs_f64()))
            .bind(vector_index)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to register container: {}", e)))?;

        self.containers
            .write()
            .map_err(|e| DomainError::storage(format!("Lock error: {}", e)))?
            .insert(spec.name.clone(), spec.clone());

        debug!(container = %spec.name, "Container ready");

        Ok(())
    }

    async fn upsert(&self, container: &str, document: Value) -> Result<(), DomainError> {
        let spec = self.spec(container)?;
        let (id, partition_key) = spec.document_keys(&document)?;
        let vector = spec.document_vector(&document)?;

        let sql = upsert_sql(&self.table(container), vector.as_deref());

        sqlx::query(&sql)
            .bind(id)
            .bind(partition_key)
            .bind(document.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to upsert document: {}", e)))?;

        Ok(())
    }

    async fn point_read(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
    ) -> Result<Option<Value>, DomainError> {
        let spec = self.spec(container)?;

        let sql = format!(
            "SELECT data FROM {} WHERE partition_key = $1 AND id = $2 AND {}",
            self.table(container),
            live_clause(&spec)
        );

        let row = sqlx::query(&sql)
            .bind(partition_key)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to read document: {}", e)))?;

        Ok(row.map(|r| r.get::<Value, _>("data")))
    }

    async fn delete(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
    ) -> Result<bool, DomainError> {
        self.spec(container)?;

        let sql = format!(
            "DELETE FROM {} WHERE partition_key = $1 AND id = $2",
            self.table(container)
        );

        let result = sqlx::query(&sql)
            .bind(partition_key)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to delete document: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn query(
        &self,
        container: &str,
        query: &DocumentQuery,
    ) -> Result<Vec<QueryHit>, DomainError> {
        let spec = self.spec(container)?;
        let (sql, binds) = select_sql(&self.table(container), &spec, query)?;

        let mut statement = sqlx::query(&sql);
        for bind in binds {
            statement = statement.bind(bind);
        }

        let rows = statement
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to query documents: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let hit = QueryHit::new(row.get::<Value, _>("data"));
                match row.get::<Option<f64>, _>("similarity") {
                    Some(similarity) => hit.with_similarity(similarity as f32),
                    None => hit,
                }
            })
            .collect())
    }

    async fn count(&self, container: &str) -> Result<usize, DomainError> {
        let spec = self.spec(container)?;

        let sql = format!(
            "SELECT COUNT(*) AS count FROM {} WHERE {}",
            self.table(container),
            live_clause(&spec)
        );

        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to count documents: {}", e)))?;

        Ok(row.get::<i64, _>("count") as usize)
    }

    async fn purge_expired(&self, container: &str) -> Result<usize, DomainError> {
        let spec = self.spec(container)?;

        if spec.default_ttl.is_none() {
            return Ok(0);
        }

        let sql = format!(
            "DELETE FROM {} WHERE NOT ({})",
            self.table(container),
            live_clause(&spec)
        );

        let result = sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to purge documents: {}", e)))?;

        Ok(result.rows_affected() as usize)
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
