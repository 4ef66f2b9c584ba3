use std::ops::{Deref, DerefMut};

use tracing::warn;

use crate::repository::{StoreTransaction, TransactionalStore};
use crate::CoreResult;

/// An open store transaction.
///
/// Dropping it without calling `commit` rolls the work back.
pub struct Transaction {
    inner: Box<dyn StoreTransaction>,
}

impl Transaction {
    pub fn new(inner: Box<dyn StoreTransaction>) -> Self {
        Self { inner }
    }

    pub async fn commit(mut self) -> CoreResult<()> {
        self.inner.commit().await
    }

    pub async fn rollback(mut self) -> CoreResult<()> {
        self.inner.rollback().await
    }
}

impl Deref for Transaction {
    type Target = dyn StoreTransaction;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for Transaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

/// Unit-of-work boundary for one use case.
///
/// `open` joins the caller's transaction when one is passed in and begins a
/// fresh one otherwise. Only a scope that began its own transaction commits or
/// rolls back in `close`; a joined scope hands the outcome back untouched so
/// the outermost owner decides. There are no savepoints: an error anywhere in
/// nested work aborts the whole outer unit.
pub enum TxScope<'a> {
    Root(Transaction),
    Joined(&'a mut Transaction),
}

impl<'a> TxScope<'a> {
    pub async fn open(
        store: &dyn TransactionalStore,
        outer: Option<&'a mut Transaction>,
    ) -> CoreResult<TxScope<'a>> {
        match outer {
            Some(tx) => Ok(TxScope::Joined(tx)),
            None => Ok(TxScope::Root(store.begin().await?)),
        }
    }

    pub fn tx(&mut self) -> &mut Transaction {
        match self {
            TxScope::Root(tx) => tx,
            TxScope::Joined(tx) => tx,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, TxScope::Root(_))
    }

    /// Commits on `Ok`, rolls back and re-raises on `Err`.
    pub async fn close<T>(self, outcome: CoreResult<T>) -> CoreResult<T> {
        match self {
            TxScope::Joined(_) => outcome,
            TxScope::Root(tx) => match outcome {
                Ok(value) => {
                    tx.commit().await?;
                    Ok(value)
                }
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(error = %rollback_err, cause = %err, "rollback failed");
                    }
                    Err(err)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::CoreError;
    use boxoffice_shared::Concert;
    use chrono::Utc;

    fn concert(name: &str) -> Concert {
        Concert::new(name.to_string(), Utc::now())
    }

    async fn visible(store: &MemoryStore, concert: &Concert) -> bool {
        let mut tx = store.begin().await.unwrap();
        tx.find_concert(concert.id).await.unwrap().is_some()
    }

    #[tokio::test]
    async fn test_root_scope_commits_on_ok() {
        let store = MemoryStore::new();
        let live = concert("Live Concert");

        let mut scope = TxScope::open(&store, None).await.unwrap();
        assert!(scope.is_root());
        let outcome = scope.tx().insert_concert(&live).await;
        scope.close(outcome).await.unwrap();

        assert!(visible(&store, &live).await);
    }

    #[tokio::test]
    async fn test_root_scope_rolls_back_and_reraises() {
        let store = MemoryStore::new();
        let live = concert("Live Concert");

        let mut scope = TxScope::open(&store, None).await.unwrap();
        scope.tx().insert_concert(&live).await.unwrap();
        let err = scope
            .close::<()>(Err(CoreError::Validation("boom".into())))
            .await
            .unwrap_err();

        assert_eq!(err, CoreError::Validation("boom".into()));
        assert!(!visible(&store, &live).await);
    }

    #[tokio::test]
    async fn test_joined_scope_leaves_boundary_to_outer() {
        let store = MemoryStore::new();
        let live = concert("Orchestra Night");

        let mut outer = TxScope::open(&store, None).await.unwrap();
        {
            let mut inner = TxScope::open(&store, Some(outer.tx())).await.unwrap();
            assert!(!inner.is_root());
            let outcome = inner.tx().insert_concert(&live).await;
            inner.close(outcome).await.unwrap();
        }

        // The inner close did not commit anything.
        assert!(!visible(&store, &live).await);
        // But the outer transaction sees its own write.
        assert!(outer.tx().find_concert(live.id).await.unwrap().is_some());

        outer
            .close::<()>(Err(CoreError::Conflict("outer failed".into())))
            .await
            .unwrap_err();
        assert!(!visible(&store, &live).await);
    }

    #[tokio::test]
    async fn test_inner_failure_aborts_outer_unit() {
        let store = MemoryStore::new();
        let first = concert("IU Concert");

        let mut outer = TxScope::open(&store, None).await.unwrap();
        outer.tx().insert_concert(&first).await.unwrap();

        let inner_outcome = {
            let inner = TxScope::open(&store, Some(outer.tx())).await.unwrap();
            inner
                .close::<()>(Err(CoreError::Validation("inner".into())))
                .await
        };
        outer.close(inner_outcome).await.unwrap_err();

        assert!(!visible(&store, &first).await);
    }

    #[tokio::test]
    async fn test_dropped_scope_rolls_back() {
        let store = MemoryStore::new();
        let live = concert("G-Dragon Concert");

        {
            let mut scope = TxScope::open(&store, None).await.unwrap();
            scope.tx().insert_concert(&live).await.unwrap();
        }

        assert!(!visible(&store, &live).await);
    }
}
