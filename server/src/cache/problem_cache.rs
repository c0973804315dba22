//! Permission-aware problem cache.
//!
//! Holds at most `capacity` full problem records, evicting the least
//! recently used. Only content is cached. Every read goes back through the
//! evaluator for the current caller before anything leaves the cache, so
//! two callers reading the same entry can see different redactions.
//!
//! A global invalidation epoch prevents a load that raced with a write from
//! re-inserting stale content after the write evicted it.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::db::ProblemId;
use crate::permissions::{BindingStore, Caller, EvaluationError, Evaluator, Permission};
use crate::problems::{ProblemRecord, ProblemView};

struct Inner {
    entries: LruCache<ProblemId, Arc<ProblemRecord>>,
    /// Incremented by every invalidation.
    epoch: u64,
}

/// Thread-safe LRU of full problem records.
pub struct ProblemCache {
    inner: Mutex<Inner>,
}

impl ProblemCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                epoch: 0,
            }),
        }
    }

    /// Cached record, marking it most recently used.
    pub fn lookup(&self, id: ProblemId) -> Option<Arc<ProblemRecord>> {
        self.inner.lock().entries.get(&id).cloned()
    }

    /// Epoch to pass to [`Self::populate_if_current`] after loading.
    pub fn begin_load(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// Insert or overwrite an entry.
    pub fn populate(&self, id: ProblemId, record: Arc<ProblemRecord>) {
        let mut inner = self.inner.lock();
        if let Some((evicted, _)) = inner.entries.push(id, record) {
            if evicted != id {
                debug!(evicted, "Problem cache evicted least recently used entry");
            }
        }
    }

    /// Insert unless an invalidation happened since `epoch` was taken.
    pub fn populate_if_current(&self, epoch: u64, id: ProblemId, record: Arc<ProblemRecord>) -> bool {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            debug!(problem_id = id, "Discarding problem load that raced an invalidation");
            return false;
        }
        inner.entries.push(id, record);
        true
    }

    /// Drop an entry. Must run before the write that changed it commits.
    pub fn invalidate(&self, id: ProblemId) {
        let mut inner = self.inner.lock();
        inner.epoch += 1;
        inner.entries.pop(&id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().entries.cap().get()
    }

    /// Cached problem as `caller` may see it, or `None` on a miss.
    ///
    /// The caller must already have passed the `view` check.
    pub async fn get<B: BindingStore>(
        &self,
        id: ProblemId,
        caller: &Caller,
        evaluator: &Evaluator<B>,
    ) -> Result<Option<ProblemView>, EvaluationError> {
        let Some(record) = self.lookup(id) else {
            debug!(problem_id = id, "Problem cache miss");
            return Ok(None);
        };
        debug!(problem_id = id, "Problem cache hit");
        redact(&record, caller, evaluator).await.map(Some)
    }
}

/// Strip the fields `caller` is not allowed to see.
pub async fn redact<B: BindingStore>(
    record: &ProblemRecord,
    caller: &Caller,
    evaluator: &Evaluator<B>,
) -> Result<ProblemView, EvaluationError> {
    let show_solutions = evaluator
        .authorize(caller, record.id, Permission::ViewSolutions)
        .await?;
    let show_roles = evaluator.authorize(caller, record.id, Permission::Edit).await?;
    Ok(record.view(show_solutions, show_roles))
}
