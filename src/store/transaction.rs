// src/store/transaction.rs

use std::{
    collections::BTreeMap,
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use rand::Rng;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use super::{DocPath, Document, DocumentStore, FieldTransform, Precondition, StoreError, Write};

fn to_body<T: Serialize>(path: &DocPath, value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization {
        path: path.to_string(),
        message: e.to_string(),
    })
}

fn lock_err() -> StoreError {
    StoreError::Backend("poisoned lock: transaction state".to_string())
}

#[derive(Debug, Default)]
struct TxState {
    reads: BTreeMap<DocPath, Option<u64>>,
    writes: Vec<Write>,
    /// Set when the same document was observed at two different versions.
    stale: Option<DocPath>,
}

/// Read-then-conditional-commit unit of work.
///
/// Handles are cheap clones sharing one staging area, so a transaction body
/// can own its handle while [`TxRunner`] keeps another one for the commit.
#[derive(Clone)]
pub struct Transaction {
    store: Arc<dyn DocumentStore>,
    state: Arc<Mutex<TxState>>,
}

impl Transaction {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(TxState::default())),
        }
    }

    /// Reads a document and records its version as a commit precondition.
    pub async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        if !self.state.lock().map_err(|_| lock_err())?.writes.is_empty() {
            return Err(StoreError::ReadAfterWrite(path.clone()));
        }

        let doc = self.store.get(path).await?;
        let version = doc.as_ref().map(|d| d.version);

        let mut state = self.state.lock().map_err(|_| lock_err())?;
        match state.reads.get(path) {
            Some(seen) if *seen != version => state.stale = Some(path.clone()),
            Some(_) => {}
            None => {
                state.reads.insert(path.clone(), version);
            }
        }
        Ok(doc)
    }

    /// Reads and deserializes a document.
    pub async fn get_as<T: DeserializeOwned>(&self, path: &DocPath) -> Result<Option<T>, StoreError> {
        match self.get(path).await? {
            Some(doc) => doc.parse().map(Some),
            None => Ok(None),
        }
    }

    fn stage(&self, write: Write) -> Result<(), StoreError> {
        self.state.lock().map_err(|_| lock_err())?.writes.push(write);
        Ok(())
    }

    /// Overwrites the document with `value`.
    pub fn set<T: Serialize>(&self, path: &DocPath, value: &T) -> Result<(), StoreError> {
        self.stage(Write::Set {
            path: path.clone(),
            data: to_body(path, value)?,
            merge: false,
            transforms: Vec::new(),
        })
    }

    /// Merges `value` into the document (creating it if needed), then applies `transforms`.
    pub fn set_merge<T: Serialize>(
        &self,
        path: &DocPath,
        value: &T,
        transforms: Vec<FieldTransform>,
    ) -> Result<(), StoreError> {
        self.stage(Write::Set {
            path: path.clone(),
            data: to_body(path, value)?,
            merge: true,
            transforms,
        })
    }

    pub fn update(&self, path: &DocPath, transforms: Vec<FieldTransform>) -> Result<(), StoreError> {
        self.stage(Write::Update {
            path: path.clone(),
            transforms,
        })
    }

    pub fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        self.stage(Write::Delete { path: path.clone() })
    }

    /// Commits staged writes if no read document changed in the meantime.
    pub async fn commit(&self) -> Result<(), StoreError> {
        let (preconditions, writes) = {
            let state = self.state.lock().map_err(|_| lock_err())?;
            if let Some(path) = &state.stale {
                return Err(StoreError::Conflict(path.clone()));
            }
            let preconditions: Vec<Precondition> = state
                .reads
                .iter()
                .map(|(path, version)| Precondition {
                    path: path.clone(),
                    version: *version,
                })
                .collect();
            (preconditions, state.writes.clone())
        };

        if writes.is_empty() {
            return Ok(());
        }
        self.store.commit(&preconditions, &writes).await
    }
}

/// Unconditional all-or-nothing group of writes.
pub struct WriteBatch {
    store: Arc<dyn DocumentStore>,
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            writes: Vec::new(),
        }
    }

    pub fn set<T: Serialize>(&mut self, path: &DocPath, value: &T, transforms: Vec<FieldTransform>) -> Result<(), StoreError> {
        self.writes.push(Write::Set {
            path: path.clone(),
            data: to_body(path, value)?,
            merge: false,
            transforms,
        });
        Ok(())
    }

    pub fn update(&mut self, path: &DocPath, transforms: Vec<FieldTransform>) {
        self.writes.push(Write::Update {
            path: path.clone(),
            transforms,
        });
    }

    pub fn delete(&mut self, path: &DocPath) {
        self.writes.push(Write::Delete { path: path.clone() });
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        let limit = self.store.max_batch_writes();
        if self.writes.len() > limit {
            return Err(StoreError::BatchTooLarge {
                staged: self.writes.len(),
                limit,
            });
        }
        if self.writes.is_empty() {
            return Ok(());
        }
        self.store.commit(&[], &self.writes).await
    }
}

/// Runs transaction bodies with bounded optimistic retry.
#[derive(Clone)]
pub struct TxRunner {
    store: Arc<dyn DocumentStore>,
    max_attempts: u32,
    base_backoff: Duration,
}

impl TxRunner {
    pub fn new(store: Arc<dyn DocumentStore>, max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Exponential backoff with full jitter, capped at one second.
    fn backoff(&self, attempt: u32) -> Duration {
        let cap = Duration::from_secs(1);
        let ceiling = self
            .base_backoff
            .saturating_mul(1u32 << attempt.min(16))
            .min(cap);
        let millis = u64::try_from(ceiling.as_millis()).unwrap_or(1000);
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }

    /// Runs `body` against a fresh [`Transaction`] and commits it, retrying the
    /// whole body when a read document changed before commit.
    ///
    /// The body must not perform side effects outside the transaction: it may
    /// run several times.
    pub async fn run<T, E, F, Fut>(&self, mut body: F) -> Result<T, E>
    where
        F: FnMut(Transaction) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<StoreError>,
    {
        for attempt in 1..=self.max_attempts {
            let tx = Transaction::new(self.store.clone());
            let value = body(tx.clone()).await?;
            match tx.commit().await {
                Ok(()) => return Ok(value),
                Err(StoreError::Conflict(path)) => {
                    tracing::debug!(%path, attempt, "transaction conflict, retrying");
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.backoff(attempt)).await;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(attempts = self.max_attempts, "transaction retry budget exhausted");
        Err(StoreError::RetryExhausted {
            attempts: self.max_attempts,
        }
        .into())
    }
}
