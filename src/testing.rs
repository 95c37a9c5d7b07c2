//! In-process stand-ins for the external services, shared by unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::ai::CompletionService;
use crate::apollo::{Endpoint, SearchResponse, SearchService};
use crate::db::{Collection, Filter, RecordStore, StoredRecord};
use crate::error::{LookupError, LookupResult, StoreError};
use crate::models::EmployeeSummary;

/// Replays scripted response bodies in order and records every call.
#[derive(Default)]
pub struct FakeSearch {
    responses: Mutex<VecDeque<LookupResult<Value>>>,
    calls: Mutex<Vec<(Endpoint, Value)>>,
}

impl FakeSearch {
    pub fn new(responses: Vec<LookupResult<Value>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Endpoint, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SearchService for FakeSearch {
    async fn search(&self, endpoint: Endpoint, params: Value) -> LookupResult<SearchResponse> {
        self.calls.lock().unwrap().push((endpoint, params));
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(body)) => SearchResponse::from_value(body),
            Some(Err(e)) => Err(e),
            None => Err(LookupError::Upstream("no scripted response left".to_string())),
        }
    }
}

#[derive(Default)]
pub struct FakeCompletion {
    replies: Mutex<VecDeque<LookupResult<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeCompletion {
    pub fn new(replies: Vec<LookupResult<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for FakeCompletion {
    async fn complete(&self, prompt: &str) -> LookupResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LookupError::Upstream("no scripted reply left".to_string())))
    }

    fn model_name(&self) -> &str {
        "fake"
    }
}

/// A store whose every operation fails.
#[derive(Default)]
pub struct BrokenStore {
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
}

#[async_trait]
impl RecordStore for BrokenStore {
    async fn get(&self, _collection: Collection, _filter: &Filter) -> Result<Option<StoredRecord>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Poisoned)
    }

    async fn upsert(&self, _collection: Collection, _key: &str, _record: StoredRecord) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Poisoned)
    }

    async fn delete_all(&self, _collection: Collection) -> Result<(), StoreError> {
        Err(StoreError::Poisoned)
    }
}

pub fn employee(id: &str, name: &str, title: &str) -> EmployeeSummary {
    EmployeeSummary {
        id: id.to_string(),
        name: name.to_string(),
        title: title.to_string(),
        company: "Acme".to_string(),
        company_id: "acme123".to_string(),
        ..Default::default()
    }
}

pub fn team(size: usize) -> Vec<EmployeeSummary> {
    (0..size)
        .map(|i| employee(&format!("e{}", i), &format!("Person {}", i), "Engineer"))
        .collect()
}
