use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction as PgTransaction, postgres::PgRow};

use crate::{
    Document, DocumentKey, DocumentQuery, Result, StoreError, Version,
    store::{CommitReceipt, DocumentStore, DocumentStream, WriteBatch, WriteOp, validate_batch},
};

const SELECT_COLUMNS: &str =
    "SELECT collection, id, version, sequence, created_at, updated_at, body FROM documents";

/// PostgreSQL-backed document store implementation.
///
/// Every collection lives in the single `documents` table. Commits run in
/// one database transaction: preconditions are checked with `FOR UPDATE`
/// row locks before any write is applied.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Creates a new PostgreSQL document store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_document(row: PgRow) -> Result<Document> {
        Ok(Document {
            collection: row.try_get("collection")?,
            id: row.try_get("id")?,
            version: Version::new(row.try_get("version")?),
            sequence: row.try_get("sequence")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            body: row.try_get("body")?,
        })
    }

    async fn check_precondition(
        tx: &mut PgTransaction<'_, Postgres>,
        key: &DocumentKey,
        expected: Option<Version>,
    ) -> Result<()> {
        let actual: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(&key.collection)
        .bind(&key.id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_conflict(e, key))?;

        let actual = actual.map(Version::new);
        if actual != expected {
            tracing::debug!(%key, ?expected, ?actual, "precondition failed");
            return Err(StoreError::ConcurrencyConflict {
                collection: key.collection.clone(),
                id: key.id.clone(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}

/// Maps unique violations and serialization failures to a conflict.
fn map_conflict(error: sqlx::Error, key: &DocumentKey) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = error
        && (db_err.constraint() == Some("documents_pkey")
            || matches!(db_err.code().as_deref(), Some("40001") | Some("40P01")))
    {
        return StoreError::ConcurrencyConflict {
            collection: key.collection.clone(),
            id: key.id.clone(),
            expected: None,
            actual: None,
        };
    }
    StoreError::Database(error)
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE collection = $1 AND id = $2"
        ))
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_document).transpose()
    }

    async fn query(&self, query: DocumentQuery) -> Result<Vec<Document>> {
        let mut sql = format!("{SELECT_COLUMNS} WHERE collection = $1");
        let mut param_count = 1;

        // Build dynamic query
        for _ in &query.filters {
            sql.push_str(&format!(
                " AND body #> ${}::text[] = ${}::jsonb",
                param_count + 1,
                param_count + 2
            ));
            param_count += 2;
        }

        if query.after_sequence.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND sequence > ${param_count}"));
        }

        sql.push_str(" ORDER BY sequence ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql).bind(&query.collection);
        for filter in &query.filters {
            sqlx_query = sqlx_query.bind(filter.path()).bind(&filter.value);
        }
        if let Some(after) = query.after_sequence {
            sqlx_query = sqlx_query.bind(after);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_document).collect()
    }

    async fn stream_collection(&self, collection: &str) -> Result<DocumentStream> {
        use futures_util::stream;

        // Rows are buffered so the stream does not borrow the pool
        let documents = self
            .query(DocumentQuery::collection(collection))
            .await?;
        let stream = stream::iter(documents.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt> {
        validate_batch(&batch)?;

        let now = Utc::now();
        if batch.is_empty() {
            return Ok(CommitReceipt {
                written: 0,
                committed_at: now,
            });
        }

        let mut tx = self.pool.begin().await?;

        for precondition in &batch.preconditions {
            Self::check_precondition(&mut tx, &precondition.key, precondition.expected).await?;
        }

        let expected_absent = |key: &DocumentKey| {
            batch
                .preconditions
                .iter()
                .any(|p| &p.key == key && p.expected.is_none())
        };

        for write in &batch.writes {
            match write {
                WriteOp::Create { key, body } => {
                    let result = sqlx::query(
                        r#"
                        INSERT INTO documents (collection, id, version, created_at, updated_at, body)
                        VALUES ($1, $2, 1, $3, $3, $4)
                        ON CONFLICT (collection, id) DO NOTHING
                        "#,
                    )
                    .bind(&key.collection)
                    .bind(&key.id)
                    .bind(now)
                    .bind(body)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_conflict(e, key))?;

                    if result.rows_affected() == 0 {
                        // Row locks cannot cover a missing row: a writer that
                        // got in after the absent read shows up here.
                        if expected_absent(key) {
                            return Err(StoreError::ConcurrencyConflict {
                                collection: key.collection.clone(),
                                id: key.id.clone(),
                                expected: None,
                                actual: None,
                            });
                        }
                        return Err(StoreError::AlreadyExists {
                            collection: key.collection.clone(),
                            id: key.id.clone(),
                        });
                    }
                }
                WriteOp::Put { key, body } if expected_absent(key) => {
                    // A concurrent insert surfaces as a primary key violation
                    sqlx::query(
                        r#"
                        INSERT INTO documents (collection, id, version, created_at, updated_at, body)
                        VALUES ($1, $2, 1, $3, $3, $4)
                        "#,
                    )
                    .bind(&key.collection)
                    .bind(&key.id)
                    .bind(now)
                    .bind(body)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_conflict(e, key))?;
                }
                WriteOp::Put { key, body } => {
                    sqlx::query(
                        r#"
                        INSERT INTO documents (collection, id, version, created_at, updated_at, body)
                        VALUES ($1, $2, 1, $3, $3, $4)
                        ON CONFLICT (collection, id) DO UPDATE SET
                            version = documents.version + 1,
                            updated_at = EXCLUDED.updated_at,
                            body = EXCLUDED.body
                        "#,
                    )
                    .bind(&key.collection)
                    .bind(&key.id)
                    .bind(now)
                    .bind(body)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_conflict(e, key))?;
                }
            }
        }

        tx.commit().await?;

        Ok(CommitReceipt {
            written: batch.writes.len(),
            committed_at: now,
        })
    }
}
