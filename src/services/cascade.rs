// src/services/cascade.rs

//! Chunked deletes: fetch a bounded page, delete it in one batch, repeat
//! until a page comes back empty. Not atomic across pages.

use std::sync::Arc;

use crate::{
    error::AppError,
    models::paths,
    store::{CollectionPath, DocPath, Document, DocumentStore, Query, StoreError, WriteBatch},
};

/// Deletes every document of `collection`, plus the companion documents
/// returned by `companions` for each one, in batches of whole documents.
///
/// `writes_per_doc` is the number of deletes one document produces
/// (itself plus its companions), used to size pages under the batch limit.
pub async fn delete_collection<F>(
    store: &Arc<dyn DocumentStore>,
    collection: &CollectionPath,
    writes_per_doc: usize,
    companions: F,
) -> Result<usize, (usize, StoreError)>
where
    F: Fn(&Document) -> Vec<DocPath>,
{
    let page = (store.max_batch_writes() / writes_per_doc.max(1)).max(1);
    let mut deleted = 0;

    loop {
        let docs = store
            .query(&Query::collection(collection.clone()).limit(page))
            .await
            .map_err(|e| (deleted, e))?;
        if docs.is_empty() {
            return Ok(deleted);
        }

        let mut batch = WriteBatch::new(store.clone());
        for doc in &docs {
            batch.delete(&doc.path);
            for companion in companions(doc) {
                batch.delete(&companion);
            }
        }
        batch.commit().await.map_err(|e| (deleted, e))?;
        deleted += docs.len();
        tracing::debug!(%collection, deleted, "cascade page deleted");
    }
}

fn partial(parent: &DocPath, deleted: usize, err: StoreError) -> AppError {
    AppError::PartialCascade {
        parent: parent.to_string(),
        deleted,
        reason: err.to_string(),
    }
}

/// Deletes all attempts of an assignment, then the assignment itself.
pub async fn delete_assignment_tree(
    store: &Arc<dyn DocumentStore>,
    class_id: &str,
    assignment_id: &str,
) -> Result<usize, AppError> {
    let assignment = paths::assignment(class_id, assignment_id);
    let attempts = paths::attempts(class_id, assignment_id);

    let deleted = delete_collection(store, &attempts, 1, |_| Vec::new())
        .await
        .map_err(|(deleted, e)| partial(&assignment, deleted, e))?;

    let mut batch = WriteBatch::new(store.clone());
    batch.delete(&assignment);
    batch
        .commit()
        .await
        .map_err(|e| partial(&assignment, deleted, e))?;

    Ok(deleted)
}

/// Deletes members (with their index rows), invites and assignments of a
/// class, then the class document. The class goes last so a failure never
/// leaves a class pointing at missing members.
pub async fn delete_class_tree(store: &Arc<dyn DocumentStore>, class_id: &str) -> Result<usize, AppError> {
    let class = paths::class(class_id);

    let members = delete_collection(store, &paths::members(class_id), 2, |doc| {
        vec![paths::class_index_entry(doc.id(), class_id)]
    })
    .await
    .map_err(|(n, e)| partial(&class, n, e))?;

    let invites = delete_collection(store, &paths::invites(class_id), 1, |_| Vec::new())
        .await
        .map_err(|(n, e)| partial(&class, members + n, e))?;
    let mut deleted = members + invites;

    let page = store.max_batch_writes().max(1);
    loop {
        let assignments = store
            .query(&Query::collection(paths::assignments(class_id)).limit(page))
            .await
            .map_err(|e| partial(&class, deleted, e))?;
        if assignments.is_empty() {
            break;
        }
        for assignment in &assignments {
            let attempts = delete_assignment_tree(store, class_id, assignment.id()).await?;
            deleted += attempts + 1;
        }
    }

    let mut batch = WriteBatch::new(store.clone());
    batch.delete(&class);
    batch.commit().await.map_err(|e| partial(&class, deleted, e))?;

    Ok(deleted + 1)
}
