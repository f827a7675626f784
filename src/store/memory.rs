// src/store/memory.rs

//! In-memory document store.
//!
//! Thread-safe, versioned, and atomic per commit. Intended for embedded use,
//! tests, and as the reference implementation of [`DocumentStore`].

use std::{cmp::Ordering, collections::BTreeMap, sync::RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{
    ChangeEvent, ChangeKind, DEFAULT_MAX_BATCH_WRITES, Direction, DocPath, Document, DocumentStore,
    Filter, FilterOp, Precondition, Query, StoreError, Write, apply_write, compare_values,
    read_field,
};

const CHANGE_FEED_CAPACITY: usize = 1024;

fn lock_err(context: &'static str) -> StoreError {
    StoreError::Backend(format!("poisoned lock: {context}"))
}

#[derive(Debug)]
struct Stored {
    data: Value,
    version: u64,
}

#[derive(Debug, Default)]
struct State {
    docs: BTreeMap<DocPath, Stored>,
    /// Store-wide counter so a recreated document never reuses a version.
    next_version: u64,
}

pub struct MemoryStore {
    state: RwLock<State>,
    changes: broadcast::Sender<ChangeEvent>,
    max_batch_writes: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_batch_limit(DEFAULT_MAX_BATCH_WRITES)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects commits with more than `max_batch_writes` writes.
    pub fn with_batch_limit(max_batch_writes: usize) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            state: RwLock::new(State::default()),
            changes,
            max_batch_writes: max_batch_writes.max(1),
        }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.docs.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn filter_matches(data: &Value, filter: &Filter) -> bool {
    let Some(value) = read_field(data, &filter.field) else {
        return false;
    };
    let ord = compare_values(value, &filter.value);
    match filter.op {
        FilterOp::Eq => value == &filter.value || (value.is_number() && ord == Ordering::Equal),
        FilterOp::Lt => ord == Ordering::Less,
        FilterOp::Lte => ord != Ordering::Greater,
        FilterOp::Gt => ord == Ordering::Greater,
        FilterOp::Gte => ord != Ordering::Less,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("get"))?;
        Ok(state.docs.get(path).map(|stored| Document {
            path: path.clone(),
            data: stored.data.clone(),
            version: stored.version,
        }))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("query"))?;
        let mut rows: Vec<Document> = state
            .docs
            .iter()
            .filter(|(path, _)| query.target.matches(&path.parent()))
            .filter(|(_, stored)| query.filters.iter().all(|f| filter_matches(&stored.data, f)))
            .map(|(path, stored)| Document {
                path: path.clone(),
                data: stored.data.clone(),
                version: stored.version,
            })
            .collect();
        drop(state);

        if let Some((field, direction)) = &query.order_by {
            rows.sort_by(|a, b| {
                let left = read_field(&a.data, field).unwrap_or(&Value::Null);
                let right = read_field(&b.data, field).unwrap_or(&Value::Null);
                let ord = compare_values(left, right);
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn commit(&self, preconditions: &[Precondition], writes: &[Write]) -> Result<(), StoreError> {
        if writes.len() > self.max_batch_writes {
            return Err(StoreError::BatchTooLarge {
                staged: writes.len(),
                limit: self.max_batch_writes,
            });
        }

        let mut state = self.state.write().map_err(|_| lock_err("commit"))?;
        for precondition in preconditions {
            let current = state.docs.get(&precondition.path).map(|d| d.version);
            if current != precondition.version {
                return Err(StoreError::Conflict(precondition.path.clone()));
            }
        }

        let now = Utc::now();
        let mut staged: BTreeMap<DocPath, Option<Value>> = BTreeMap::new();
        for write in writes {
            let current = match staged.get(write.path()) {
                Some(pending) => pending.as_ref(),
                None => state.docs.get(write.path()).map(|d| &d.data),
            };
            let next = apply_write(current, write, now)?;
            staged.insert(write.path().clone(), next);
        }

        let mut events = Vec::with_capacity(staged.len());
        for (path, next) in staged {
            match next {
                Some(data) => {
                    state.next_version += 1;
                    let version = state.next_version;
                    state.docs.insert(path.clone(), Stored { data, version });
                    events.push(ChangeEvent { path, kind: ChangeKind::Upserted });
                }
                None => {
                    if state.docs.remove(&path).is_some() {
                        events.push(ChangeEvent { path, kind: ChangeKind::Deleted });
                    }
                }
            }
        }
        drop(state);

        for event in events {
            // No receivers is fine: nobody is watching.
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CollectionPath, FieldTransform};
    use serde_json::json;

    fn set(path: &DocPath, data: Value) -> Write {
        Write::Set {
            path: path.clone(),
            data,
            merge: false,
            transforms: vec![],
        }
    }

    #[tokio::test]
    async fn test_query_filters_orders_and_limits() {
        let store = MemoryStore::new();
        let users = CollectionPath::root("users");
        let writes = vec![
            set(&users.doc("a"), json!({"emailLower": "a@x.io", "rank": 3})),
            set(&users.doc("b"), json!({"emailLower": "b@x.io", "rank": 1})),
            set(&users.doc("c"), json!({"emailLower": "c@x.io", "rank": 2})),
        ];
        store.commit(&[], &writes).await.unwrap();

        let found = store
            .query(&Query::collection(users.clone()).where_eq("emailLower", "b@x.io"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), "b");

        let ordered = store
            .query(&Query::collection(users).order_by("rank", Direction::Descending).limit(2))
            .await
            .unwrap();
        let ids: Vec<&str> = ordered.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_query_range_filters() {
        let store = MemoryStore::new();
        let scores = CollectionPath::root("scores");
        let writes = vec![
            set(&scores.doc("a"), json!({"score": 1, "at": "2025-01-01T00:00:00Z"})),
            set(&scores.doc("b"), json!({"score": 2, "at": "2025-02-01T00:00:00Z"})),
            set(&scores.doc("c"), json!({"score": 3, "at": "2025-03-01T00:00:00Z"})),
            set(&scores.doc("d"), json!({"at": "2025-04-01T00:00:00Z"})),
        ];
        store.commit(&[], &writes).await.unwrap();

        let ids = |docs: Vec<Document>| docs.iter().map(|d| d.id().to_string()).collect::<Vec<_>>();
        let run = |filter: (FilterOp, i64)| {
            Query::collection(scores.clone())
                .filter("score", filter.0, filter.1)
                .order_by("score", Direction::Ascending)
        };

        assert_eq!(ids(store.query(&run((FilterOp::Lt, 2))).await.unwrap()), vec!["a"]);
        assert_eq!(ids(store.query(&run((FilterOp::Lte, 2))).await.unwrap()), vec!["a", "b"]);
        assert_eq!(ids(store.query(&run((FilterOp::Gt, 2))).await.unwrap()), vec!["c"]);
        assert_eq!(ids(store.query(&run((FilterOp::Gte, 2))).await.unwrap()), vec!["b", "c"]);

        // Documents without the field never match, and strings compare lexically.
        let window = store
            .query(
                &Query::collection(scores)
                    .filter("at", FilterOp::Gte, "2025-02-01T00:00:00Z")
                    .filter("at", FilterOp::Lt, "2025-04-01T00:00:00Z"),
            )
            .await
            .unwrap();
        assert_eq!(ids(window), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_group_query_spans_parents() {
        let store = MemoryStore::new();
        let classes = CollectionPath::root("classes");
        let writes = vec![
            set(&classes.doc("c1").collection("invites").doc("i1"), json!({"email": "x@y.z"})),
            set(&classes.doc("c2").collection("invites").doc("i2"), json!({"email": "x@y.z"})),
            set(&classes.doc("c2").collection("members").doc("u1"), json!({"email": "x@y.z"})),
        ];
        store.commit(&[], &writes).await.unwrap();

        let found = store
            .query(&Query::group("invites").where_eq("email", "x@y.z"))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_commit_changes_nothing() {
        let store = MemoryStore::new();
        let a = DocPath::parse("t/a").unwrap();
        let missing = DocPath::parse("t/missing").unwrap();
        let writes = vec![
            set(&a, json!({"n": 1})),
            Write::Update {
                path: missing,
                transforms: vec![FieldTransform::increment("n", 1)],
            },
        ];
        assert!(matches!(store.commit(&[], &writes).await, Err(StoreError::NotFound(_))));
        assert!(store.get(&a).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_versions_never_reused_and_changes_broadcast() {
        let store = MemoryStore::new();
        let mut feed = store.subscribe();
        let a = DocPath::parse("t/a").unwrap();

        store.commit(&[], &[set(&a, json!({}))]).await.unwrap();
        let first = store.get(&a).await.unwrap().unwrap().version;
        store.commit(&[], &[Write::Delete { path: a.clone() }]).await.unwrap();
        store.commit(&[], &[set(&a, json!({}))]).await.unwrap();
        let second = store.get(&a).await.unwrap().unwrap().version;
        assert!(second > first);

        assert_eq!(feed.recv().await.unwrap().kind, ChangeKind::Upserted);
        assert_eq!(feed.recv().await.unwrap().kind, ChangeKind::Deleted);
        assert_eq!(feed.recv().await.unwrap().kind, ChangeKind::Upserted);
    }
}
