// src/store/watch.rs

//! Live views over documents and queries.
//!
//! A watch yields the current value first, then a fresh value after every
//! committed change that touches its target. The sequence never ends on its
//! own; dropping the watch is the way to stop. A receiver that fell behind
//! simply re-reads, so a slow consumer sees the latest state rather than every
//! intermediate one.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};

use super::{ChangeEvent, DocPath, Document, DocumentStore, Query, StoreError};

async fn next_relevant(
    rx: &mut broadcast::Receiver<ChangeEvent>,
    relevant: impl Fn(&ChangeEvent) -> bool,
) -> Result<(), StoreError> {
    loop {
        match rx.recv().await {
            Ok(event) if relevant(&event) => return Ok(()),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "change feed lagged, re-reading");
                return Ok(());
            }
            Err(RecvError::Closed) => return Err(StoreError::Closed),
        }
    }
}

/// Watches a single document.
pub struct DocWatch {
    store: Arc<dyn DocumentStore>,
    path: DocPath,
    rx: broadcast::Receiver<ChangeEvent>,
    primed: bool,
}

impl DocWatch {
    pub fn new(store: Arc<dyn DocumentStore>, path: DocPath) -> Self {
        // Subscribe before the first read so no commit slips between them.
        let rx = store.subscribe();
        Self {
            store,
            path,
            rx,
            primed: false,
        }
    }

    /// Current value of the document (`None` while it does not exist).
    pub async fn next(&mut self) -> Result<Option<Document>, StoreError> {
        if self.primed {
            let path = self.path.clone();
            next_relevant(&mut self.rx, |event| event.path == path).await?;
        }
        self.primed = true;
        self.store.get(&self.path).await
    }
}

/// Watches the result set of a query.
pub struct QueryWatch {
    store: Arc<dyn DocumentStore>,
    query: Query,
    rx: broadcast::Receiver<ChangeEvent>,
    primed: bool,
}

impl QueryWatch {
    pub fn new(store: Arc<dyn DocumentStore>, query: Query) -> Self {
        let rx = store.subscribe();
        Self {
            store,
            query,
            rx,
            primed: false,
        }
    }

    pub async fn next(&mut self) -> Result<Vec<Document>, StoreError> {
        if self.primed {
            let target = self.query.target.clone();
            next_relevant(&mut self.rx, |event| target.matches(&event.path.parent())).await?;
        }
        self.primed = true;
        self.store.query(&self.query).await
    }
}
