// src/store/postgres.rs

//! Postgres-backed document store.
//!
//! Every document is one row of the `documents` table (see `migrations/`).
//! Commits lock the touched rows, verify read versions, and take a fresh
//! version from `documents_version_seq` on every write. Change notifications
//! are broadcast in-process after commit.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tokio::sync::broadcast;

use super::{
    ChangeEvent, ChangeKind, DEFAULT_MAX_BATCH_WRITES, Direction, DocPath, Document, DocumentStore,
    FilterOp, Precondition, Query, QueryTarget, StoreError, Write, apply_write,
};

const CHANGE_FEED_CAPACITY: usize = 1024;

type Row = (String, Value, i64);

fn to_document(row: Row) -> Result<Document, StoreError> {
    let (path, data, version) = row;
    Ok(Document {
        path: DocPath::parse(&path)?,
        data,
        version: u64::try_from(version).unwrap_or_default(),
    })
}

fn field_path(field: &str) -> Vec<String> {
    field.split('.').map(str::to_string).collect()
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    changes: broadcast::Sender<ChangeEvent>,
    max_batch_writes: usize,
}

impl PgStore {
    pub fn new(pool: PgPool, max_batch_writes: usize) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            pool,
            changes,
            max_batch_writes: max_batch_writes.max(1),
        }
    }

    pub fn with_default_limit(pool: PgPool) -> Self {
        Self::new(pool, DEFAULT_MAX_BATCH_WRITES)
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let row: Option<Row> =
            sqlx::query_as("SELECT path, data, version FROM documents WHERE path = $1")
                .bind(path.as_str())
                .fetch_optional(&self.pool)
                .await?;
        row.map(to_document).transpose()
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT path, data, version FROM documents WHERE ");
        match &query.target {
            QueryTarget::Collection(collection) => {
                builder.push("parent = ").push_bind(collection.as_str().to_string());
            }
            QueryTarget::Group(collection_id) => {
                builder.push("collection_id = ").push_bind(collection_id.clone());
            }
        }

        for filter in &query.filters {
            builder.push(" AND (data #> ").push_bind(field_path(&filter.field));
            let op = match filter.op {
                FilterOp::Eq => ") = ",
                FilterOp::Lt => ") < ",
                FilterOp::Lte => ") <= ",
                FilterOp::Gt => ") > ",
                FilterOp::Gte => ") >= ",
            };
            builder.push(op).push_bind(filter.value.clone());
        }

        match &query.order_by {
            Some((field, direction)) => {
                builder.push(" ORDER BY (data #> ").push_bind(field_path(field));
                builder.push(match direction {
                    Direction::Ascending => ") ASC NULLS FIRST, path",
                    Direction::Descending => ") DESC NULLS LAST, path",
                });
            }
            None => {
                builder.push(" ORDER BY path");
            }
        }

        if let Some(limit) = query.limit {
            builder
                .push(" LIMIT ")
                .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows: Vec<Row> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(to_document).collect()
    }

    async fn commit(&self, preconditions: &[Precondition], writes: &[Write]) -> Result<(), StoreError> {
        if writes.len() > self.max_batch_writes {
            return Err(StoreError::BatchTooLarge {
                staged: writes.len(),
                limit: self.max_batch_writes,
            });
        }

        let mut touched: Vec<String> = preconditions
            .iter()
            .map(|p| p.path.as_str().to_string())
            .chain(writes.iter().map(|w| w.path().as_str().to_string()))
            .collect();
        touched.sort();
        touched.dedup();

        let mut tx = self.pool.begin().await?;

        let locked: Vec<Row> = sqlx::query_as(
            "SELECT path, data, version FROM documents WHERE path = ANY($1) ORDER BY path FOR UPDATE",
        )
        .bind(&touched)
        .fetch_all(&mut *tx)
        .await?;
        let current: HashMap<String, (Value, i64)> = locked
            .into_iter()
            .map(|(path, data, version)| (path, (data, version)))
            .collect();

        for precondition in preconditions {
            let observed = current
                .get(precondition.path.as_str())
                .map(|(_, version)| u64::try_from(*version).unwrap_or_default());
            if observed != precondition.version {
                return Err(StoreError::Conflict(precondition.path.clone()));
            }
        }

        let now = Utc::now();
        let mut staged: BTreeMap<DocPath, Option<Value>> = BTreeMap::new();
        for write in writes {
            let existing = match staged.get(write.path()) {
                Some(pending) => pending.as_ref(),
                None => current.get(write.path().as_str()).map(|(data, _)| data),
            };
            let next = apply_write(existing, write, now)?;
            staged.insert(write.path().clone(), next);
        }

        let mut events = Vec::with_capacity(staged.len());
        for (path, next) in staged {
            let existed = current.contains_key(path.as_str());
            match next {
                Some(data) if existed => {
                    sqlx::query(
                        "UPDATE documents SET data = $2, version = nextval('documents_version_seq'), updated_at = NOW() \
                         WHERE path = $1",
                    )
                    .bind(path.as_str())
                    .bind(&data)
                    .execute(&mut *tx)
                    .await?;
                    events.push(ChangeEvent { path, kind: ChangeKind::Upserted });
                }
                Some(data) => {
                    let parent = path.parent();
                    let inserted = sqlx::query(
                        "INSERT INTO documents (path, parent, collection_id, data, version) \
                         VALUES ($1, $2, $3, $4, nextval('documents_version_seq')) \
                         ON CONFLICT (path) DO NOTHING",
                    )
                    .bind(path.as_str())
                    .bind(parent.as_str())
                    .bind(parent.collection_id())
                    .bind(&data)
                    .execute(&mut *tx)
                    .await?;
                    // A concurrent writer created the row after we locked.
                    if inserted.rows_affected() == 0 {
                        return Err(StoreError::Conflict(path));
                    }
                    events.push(ChangeEvent { path, kind: ChangeKind::Upserted });
                }
                None if existed => {
                    sqlx::query("DELETE FROM documents WHERE path = $1")
                        .bind(path.as_str())
                        .execute(&mut *tx)
                        .await?;
                    events.push(ChangeEvent { path, kind: ChangeKind::Deleted });
                }
                None => {}
            }
        }

        tx.commit().await?;

        for event in events {
            let _ = self.changes.send(event);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    fn max_batch_writes(&self) -> usize {
        self.max_batch_writes
    }
}
