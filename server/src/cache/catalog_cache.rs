//! Public catalog page cache.
//!
//! Accelerates listing for callers that hold only the public role. The
//! cache is filled by one bounded query (`capacity` rows, ordered by id) and
//! records how many rows that query actually returned. Pages are served by
//! position within that loaded sequence, never by id arithmetic, since ids
//! have gaps after deletions.
//!
//! Storage is used directly when:
//! - the caller holds any role beyond the public one, or is an administrator
//! - the requested window ends past the loaded rows and the load was
//!   truncated at `capacity` (more rows may exist in storage)
//!
//! Totals always come from a COUNT query, never from the cache.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::db::{self, ProblemId, ProblemSummary, Storage, StorageError};
use crate::permissions::{Caller, PUBLIC_ROLE};

/// Where a page was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSource {
    Cache,
    Storage,
    /// First public request: loaded, cached, then served.
    Populated,
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    #[serde(skip)]
    pub source: PageSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Extent {
    /// Rows the populating query returned.
    loaded: usize,
    /// The query returned fewer rows than it asked for, so nothing exists
    /// past `loaded`.
    complete: bool,
}

struct Inner {
    entries: LruCache<ProblemId, ProblemSummary>,
    /// Ids in listing order, `order.len() == extent.loaded`.
    order: Vec<ProblemId>,
    extent: Option<Extent>,
    epoch: u64,
}

enum Plan {
    Bypass(&'static str),
    Populate(u64),
    Serve(Vec<ProblemSummary>),
}

/// Thread-safe cache of the public catalog prefix.
pub struct CatalogCache {
    inner: Mutex<Inner>,
    capacity: NonZeroUsize,
}

impl CatalogCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                order: Vec::new(),
                extent: None,
                epoch: 0,
            }),
            capacity,
        }
    }

    /// Rows loaded by the last population, `None` if not populated.
    pub fn extent(&self) -> Option<usize> {
        self.inner.lock().extent.map(|e| e.loaded)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget everything. Called by every write that can change listing.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
        inner.extent = None;
        inner.epoch += 1;
    }

    /// Replace contents with the first rows of the public listing.
    ///
    /// Ignored if a reset happened since `epoch` was taken.
    fn populate_if_current(&self, epoch: u64, rows: &[ProblemSummary]) -> bool {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            debug!("Discarding catalog load that raced a reset");
            return false;
        }
        inner.entries.clear();
        inner.order = rows.iter().map(|r| r.id).collect();
        for row in rows {
            inner.entries.put(row.id, row.clone());
        }
        inner.extent = Some(Extent {
            loaded: rows.len(),
            complete: rows.len() < self.capacity.get(),
        });
        true
    }

    fn plan(&self, caller: &Caller, per_page: usize, offset: usize) -> Plan {
        if caller.is_admin() || caller.has_extra_roles() {
            return Plan::Bypass("caller holds non-public roles");
        }

        let mut inner = self.inner.lock();
        let Some(extent) = inner.extent else {
            return Plan::Populate(inner.epoch);
        };

        let end = offset.saturating_add(per_page);
        if end > extent.loaded && !extent.complete {
            return Plan::Bypass("window exceeds populated extent");
        }

        let ids: Vec<ProblemId> = inner
            .order
            .iter()
            .skip(offset)
            .take(per_page)
            .copied()
            .collect();
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            match inner.entries.get(&id) {
                Some(row) => items.push(row.clone()),
                None => return Plan::Bypass("cached entry missing"),
            }
        }
        Plan::Serve(items)
    }

    async fn query_page(
        storage: &Storage,
        visible_to: Option<(&[String], u64)>,
        per_page: usize,
        offset: usize,
    ) -> Result<Vec<ProblemSummary>, StorageError> {
        let mut conn = storage.acquire().await?;
        let limit = i64::try_from(per_page).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        Ok(db::list_problem_summaries(&mut conn, visible_to, limit, offset).await?)
    }

    /// Serve `[offset, offset + per_page)` of the listing visible to `caller`.
    ///
    /// `view_mask` is the bit of the `view` permission.
    #[tracing::instrument(skip(self, storage, caller), fields(user_id = ?caller.user_id))]
    pub async fn serve_page(
        &self,
        storage: &Storage,
        caller: &Caller,
        view_mask: u64,
        per_page: usize,
        offset: usize,
    ) -> Result<Page<ProblemSummary>, StorageError> {
        let public = vec![PUBLIC_ROLE.to_string()];
        let roles = caller.role_list();
        let visible_to = if caller.is_admin() {
            None
        } else if caller.has_extra_roles() {
            Some((roles.as_slice(), view_mask))
        } else {
            Some((public.as_slice(), view_mask))
        };

        let (items, source) = match self.plan(caller, per_page, offset) {
            Plan::Serve(items) => {
                debug!("Catalog served from cache");
                (items, PageSource::Cache)
            }
            Plan::Populate(epoch) => {
                let rows = {
                    let mut conn = storage.acquire().await?;
                    db::list_problem_summaries(
                        &mut conn,
                        visible_to,
                        self.capacity.get() as i64,
                        0,
                    )
                    .await?
                };
                self.populate_if_current(epoch, &rows);
                debug!(loaded = rows.len(), "Catalog cache populated");

                let truncated = rows.len() >= self.capacity.get();
                if truncated && offset.saturating_add(per_page) > rows.len() {
                    debug!("Window exceeds freshly populated extent");
                    let items = Self::query_page(storage, visible_to, per_page, offset).await?;
                    (items, PageSource::Storage)
                } else {
                    let items = rows.into_iter().skip(offset).take(per_page).collect();
                    (items, PageSource::Populated)
                }
            }
            Plan::Bypass(reason) => {
                debug!(reason, "Catalog cache bypassed");
                let items = Self::query_page(storage, visible_to, per_page, offset).await?;
                (items, PageSource::Storage)
            }
        };

        let total = {
            let mut conn = storage.acquire().await?;
            db::count_problems(&mut conn, visible_to).await?
        };

        Ok(Page {
            items,
            total,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::SiteFlags;

    fn summaries(ids: impl IntoIterator<Item = ProblemId>) -> Vec<ProblemSummary> {
        ids.into_iter()
            .map(|id| ProblemSummary {
                id,
                title: format!("P{id}"),
                difficulty: "Easy".into(),
            })
            .collect()
    }

    fn cache(capacity: usize) -> CatalogCache {
        CatalogCache::new(NonZeroUsize::new(capacity).unwrap())
    }

    fn ids(plan: Plan) -> Option<Vec<ProblemId>> {
        match plan {
            Plan::Serve(items) => Some(items.into_iter().map(|s| s.id).collect()),
            _ => None,
        }
    }

    #[test]
    fn unpopulated_plans_population() {
        let cache = cache(30);
        assert!(matches!(cache.plan(&Caller::anonymous(), 10, 0), Plan::Populate(0)));
    }

    #[test]
    fn window_past_truncated_extent_bypasses() {
        let cache = cache(30);
        assert!(cache.populate_if_current(0, &summaries(1..=30)));
        assert_eq!(cache.extent(), Some(30));

        let anon = Caller::anonymous();
        assert!(matches!(cache.plan(&anon, 10, 25), Plan::Bypass(_)));
        assert_eq!(ids(cache.plan(&anon, 10, 20)), Some((21..=30).collect()));
    }

    #[test]
    fn positions_not_ids_after_gaps() {
        let cache = cache(30);
        // ids 1..=50 with every third deleted
        let rows = summaries((1..=50).filter(|id| id % 3 != 0));
        let loaded: Vec<ProblemId> = rows.iter().take(30).map(|r| r.id).collect();
        cache.populate_if_current(0, &rows[..30]);

        let page = ids(cache.plan(&Caller::anonymous(), 10, 10)).unwrap();
        assert_eq!(page, loaded[10..20].to_vec());
    }

    #[test]
    fn complete_extent_serves_short_and_empty_pages() {
        let cache = cache(30);
        cache.populate_if_current(0, &summaries(1..=12));

        let anon = Caller::anonymous();
        assert_eq!(ids(cache.plan(&anon, 10, 10)), Some(vec![11, 12]));
        assert_eq!(ids(cache.plan(&anon, 10, 20)), Some(vec![]));
    }

    #[test]
    fn extra_roles_and_admin_bypass() {
        let cache = cache(30);
        cache.populate_if_current(0, &summaries(1..=5));

        let member = Caller::new(Some(1), [PUBLIC_ROLE, "setter"], SiteFlags::empty());
        assert!(matches!(cache.plan(&member, 10, 0), Plan::Bypass(_)));
        let admin = Caller::new(Some(1), [PUBLIC_ROLE], SiteFlags::ADMINISTRATOR);
        assert!(matches!(cache.plan(&admin, 10, 0), Plan::Bypass(_)));
    }

    #[test]
    fn reset_discards_racing_population() {
        let cache = cache(30);
        let Plan::Populate(epoch) = cache.plan(&Caller::anonymous(), 10, 0) else {
            panic!("expected population");
        };
        cache.reset();
        assert!(!cache.populate_if_current(epoch, &summaries(1..=3)));
        assert_eq!(cache.extent(), None);
        assert!(cache.is_empty());
    }
}
