use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::ai::CompletionService;
use crate::apollo::SearchService;
use crate::companies;
use crate::db::{employee_cache_key, Collection, RecordStore};
use crate::employees;
use crate::enrich;
use crate::error::LookupResult;
use crate::models::{CompanyRecord, EmployeeDetail, EmployeeSummary, Resolved};
use crate::relevance;

/// One async lock per key, so overlapping calls for the same key run one
/// after the other. Entries are dropped once nobody holds or waits on them.
#[derive(Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    async fn acquire(&self, key: String) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or_default()
    }
}

/// The data-access layer handed to the front end: the record store and both
/// services, built once and shared by every operation.
///
/// Calls for the same company name or employee key are serialized, so a
/// repeated request waits for the first and then hits the cache. Calls for
/// different keys still overlap and may complete in any order; the caller
/// has to drop results it no longer wants.
pub struct Session {
    store: Arc<dyn RecordStore>,
    search: Arc<dyn SearchService>,
    completion: Arc<dyn CompletionService>,
    locks: KeyedLocks,
}

impl Session {
    pub fn new(
        store: Arc<dyn RecordStore>,
        search: Arc<dyn SearchService>,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        Self {
            store,
            search,
            completion,
            locks: KeyedLocks::default(),
        }
    }

    pub async fn resolve_company(&self, name: &str, countries: &[String]) -> LookupResult<Resolved<CompanyRecord>> {
        let _guard = self
            .locks
            .acquire(format!("company:{}", name.trim().to_lowercase()))
            .await;
        companies::resolve_company(self.store.as_ref(), self.search.as_ref(), name, countries).await
    }

    pub async fn resolve_employees(
        &self,
        company_id: &str,
        query: &str,
        regions: &[String],
    ) -> LookupResult<Resolved<Vec<EmployeeSummary>>> {
        let _guard = self
            .locks
            .acquire(format!("employees:{}", employee_cache_key(company_id, query, regions)))
            .await;
        employees::resolve_employees(self.store.as_ref(), self.search.as_ref(), company_id, query, regions).await
    }

    pub async fn select_relevant(&self, employees: Vec<EmployeeSummary>, query: &str) -> Vec<EmployeeSummary> {
        relevance::select_relevant(self.completion.as_ref(), employees, query).await
    }

    pub async fn enrich(&self, employees: Vec<EmployeeSummary>) -> LookupResult<Vec<EmployeeDetail>> {
        enrich::enrich(self.search.as_ref(), employees).await
    }

    /// Drop every cached employee list. Company records are kept.
    pub async fn clear_cache(&self) -> LookupResult<()> {
        self.store.delete_all(Collection::EmployeeCache).await?;
        tracing::info!("employee cache cleared");
        Ok(())
    }
}
