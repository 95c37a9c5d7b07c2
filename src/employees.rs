use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::apollo::{Endpoint, Person, SearchService};
use crate::db::{employee_cache_key, Collection, Filter, RecordStore, StoredRecord};
use crate::error::LookupResult;
use crate::models::{EmployeeSummary, Resolved};

pub const PAGE_SIZE: u32 = 100;

pub fn people_search_params(company_id: &str, query: &str, regions: &[String]) -> Value {
    let mut params = Map::new();
    params.insert("organization_ids".to_string(), json!([company_id]));

    let keywords = query.trim();
    if !keywords.is_empty() {
        params.insert("q_keywords".to_string(), json!(keywords));
    }
    if !regions.is_empty() {
        params.insert("person_locations".to_string(), json!(regions));
    }

    params.insert("page".to_string(), json!(1));
    params.insert("per_page".to_string(), json!(PAGE_SIZE));
    Value::Object(params)
}

pub fn person_to_summary(person: Person) -> EmployeeSummary {
    let name = [person.first_name.as_deref(), person.last_name.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let company = person.organization_name().unwrap_or_default().to_string();
    let company_id = person.organization_id().unwrap_or_default().to_string();

    EmployeeSummary {
        id: person.id.unwrap_or_default(),
        name,
        title: person.title.unwrap_or_default(),
        company,
        company_id,
        department: person
            .subdepartments
            .and_then(|subs| subs.into_iter().next())
            .unwrap_or_default(),
        location: person.country.unwrap_or_default(),
        linkedin_url: person.linkedin_url.unwrap_or_default(),
        profile_image_url: person.photo_url.unwrap_or_default(),
        selected: false,
    }
}

/// Keep employees with no location or whose location mentions one of the
/// regions. Matching is a case-sensitive substring test.
pub fn filter_by_regions(employees: Vec<EmployeeSummary>, regions: &[String]) -> Vec<EmployeeSummary> {
    if regions.is_empty() {
        return employees;
    }
    employees
        .into_iter()
        .filter(|emp| emp.location.is_empty() || regions.iter().any(|r| emp.location.contains(r.as_str())))
        .collect()
}

async fn cached_employees(
    store: &dyn RecordStore,
    company_id: &str,
    query: &str,
    regions: &[String],
) -> Option<Vec<EmployeeSummary>> {
    let filter = Filter::EmployeeKey {
        company_id: company_id.to_string(),
        query: query.to_string(),
        regions: regions.to_vec(),
    };
    let record = match store.get(Collection::EmployeeCache, &filter).await {
        Ok(Some(record)) => record,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(error = %e, company_id, "employee cache read failed, treating as miss");
            return None;
        }
    };

    if !record.is_fresh(Utc::now()) {
        tracing::debug!(company_id, stored_at = %record.stored_at, "cached employees are stale");
        return None;
    }

    match serde_json::from_value::<Vec<EmployeeSummary>>(record.payload["employees"].clone()) {
        Ok(employees) if !employees.is_empty() => Some(employees),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, company_id, "cached employee payload unreadable");
            None
        }
    }
}

async fn save_employees(
    store: &dyn RecordStore,
    company_id: &str,
    query: &str,
    regions: &[String],
    employees: &[EmployeeSummary],
) {
    // Selection is session state and never goes into the cache
    let unselected: Vec<EmployeeSummary> = employees
        .iter()
        .cloned()
        .map(|mut emp| {
            emp.selected = false;
            emp
        })
        .collect();

    let company_name = employees.first().map(|e| e.company.clone()).unwrap_or_default();
    let key = employee_cache_key(company_id, query, regions);
    let payload = json!({
        "company_id": company_id,
        "query": query,
        "regions": regions,
        "employees": unselected,
    });

    let record = StoredRecord::new(key.clone(), company_name, payload);
    match store.upsert(Collection::EmployeeCache, &key, record).await {
        Ok(()) => tracing::debug!(company_id, count = employees.len(), "employee data cached"),
        Err(e) => tracing::warn!(error = %e, company_id, "failed to cache employee data"),
    }
}

/// Find employees of a company matching a role query, cache-first. A fresh
/// cache entry is returned as stored, without re-filtering.
pub async fn resolve_employees(
    store: &dyn RecordStore,
    search: &dyn SearchService,
    company_id: &str,
    query: &str,
    regions: &[String],
) -> LookupResult<Resolved<Vec<EmployeeSummary>>> {
    if let Some(employees) = cached_employees(store, company_id, query, regions).await {
        tracing::info!(company_id, count = employees.len(), "using cached employee data");
        return Ok(Resolved::cached(employees));
    }

    tracing::info!(company_id, query, "no cached employees, searching");
    let people = search
        .search(Endpoint::PeopleSearch, people_search_params(company_id, query, regions))
        .await?
        .into_people()?;

    let fetched = people.len();
    let employees = filter_by_regions(people.into_iter().map(person_to_summary).collect(), regions);
    tracing::info!(fetched, kept = employees.len(), "filtered employees by region");

    if !employees.is_empty() {
        save_employees(store, company_id, query, regions, &employees).await;
    }

    Ok(Resolved::fetched(employees))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::LookupError;
    use crate::models::Origin;
    use crate::testing::{BrokenStore, FakeSearch};
    use chrono::Duration;

    fn regions(names: &[&str]) -> Vec<String> {
        names.iter().map(|r| r.to_string()).collect()
    }

    fn person(id: &str, first: &str, last: &str, country: &str) -> Value {
        json!({
            "id": id,
            "first_name": first,
            "last_name": last,
            "title": "Software Engineer",
            "country": country,
            "linkedin_url": format!("https://linkedin.com/in/{}", id),
            "subdepartments": ["engineering", "platform"],
            "organization": {"id": "acme123", "name": "Acme"}
        })
    }

    fn three_countries() -> Value {
        json!({"people": [
            person("p1", "Jane", "Doe", "Germany"),
            person("p2", "Jean", "Dupont", "France"),
            person("p3", "Alex", "Nowhere", ""),
        ]})
    }

    #[test]
    fn test_people_search_params_full() {
        let params = people_search_params("acme123", "  engineer ", &regions(&["Germany"]));
        assert_eq!(
            params,
            json!({
                "organization_ids": ["acme123"],
                "q_keywords": "engineer",
                "person_locations": ["Germany"],
                "page": 1,
                "per_page": 100
            })
        );
    }

    #[test]
    fn test_people_search_params_omits_empty_parts() {
        let params = people_search_params("acme123", "   ", &[]);
        assert!(params.get("q_keywords").is_none());
        assert!(params.get("person_locations").is_none());
        assert_eq!(params["per_page"], 100);
    }

    #[test]
    fn test_person_to_summary_defaults() {
        let person: Person = serde_json::from_value(json!({"id": "p9", "first_name": "Cher"})).unwrap();
        let summary = person_to_summary(person);
        assert_eq!(summary.name, "Cher");
        assert_eq!(summary.title, "");
        assert_eq!(summary.company, "");
        assert_eq!(summary.department, "");
        assert!(!summary.selected);
    }

    #[test]
    fn test_person_to_summary_maps_fields() {
        let person: Person = serde_json::from_value(person("p1", "Jane", "Doe", "Germany")).unwrap();
        let summary = person_to_summary(person);
        assert_eq!(summary.name, "Jane Doe");
        assert_eq!(summary.company, "Acme");
        assert_eq!(summary.company_id, "acme123");
        assert_eq!(summary.department, "engineering");
        assert_eq!(summary.location, "Germany");
        assert_eq!(summary.linkedin_url, "https://linkedin.com/in/p1");
    }

    #[test]
    fn test_filter_by_regions_is_case_sensitive_substring() {
        let mut a = EmployeeSummary::default();
        a.location = "Berlin, Germany".to_string();
        let mut b = EmployeeSummary::default();
        b.location = "germany".to_string();
        let c = EmployeeSummary::default();

        let kept = filter_by_regions(vec![a.clone(), b, c.clone()], &regions(&["Germany"]));
        assert_eq!(kept, vec![a, c]);
    }

    #[tokio::test]
    async fn test_region_filter_example() {
        let db = Database::open_in_memory().unwrap();
        let search = FakeSearch::new(vec![Ok(three_countries())]);

        let resolved = resolve_employees(&db, &search, "acme123", "engineer", &regions(&["Germany"]))
            .await
            .unwrap();

        let ids: Vec<&str> = resolved.value.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p3"]);
        assert_eq!(resolved.origin, Origin::Network);
    }

    #[tokio::test]
    async fn test_second_call_served_from_cache() {
        let db = Database::open_in_memory().unwrap();
        let search = FakeSearch::new(vec![Ok(three_countries())]);
        let germany = regions(&["Germany"]);

        let first = resolve_employees(&db, &search, "acme123", "engineer", &germany).await.unwrap();
        let second = resolve_employees(&db, &search, "acme123", "engineer", &germany).await.unwrap();

        assert_eq!(first.value, second.value);
        assert!(second.from_cache());
        assert_eq!(search.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_is_not_refiltered() {
        let db = Database::open_in_memory().unwrap();
        let germany = regions(&["Germany"]);
        let mut outsider = EmployeeSummary::default();
        outsider.id = "p2".to_string();
        outsider.location = "France".to_string();
        let key = employee_cache_key("acme123", "engineer", &germany);
        let payload = json!({
            "company_id": "acme123",
            "query": "engineer",
            "regions": germany,
            "employees": [outsider],
        });
        db.upsert(Collection::EmployeeCache, &key, StoredRecord::new(key.clone(), "Acme", payload))
            .await
            .unwrap();

        let search = FakeSearch::default();
        let resolved = resolve_employees(&db, &search, "acme123", "engineer", &germany).await.unwrap();
        assert_eq!(resolved.value.len(), 1);
        assert_eq!(resolved.value[0].location, "France");
        assert_eq!(search.call_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_entry_triggers_search() {
        let db = Database::open_in_memory().unwrap();
        let key = employee_cache_key("acme123", "engineer", &[]);
        let payload = json!({
            "company_id": "acme123",
            "query": "engineer",
            "regions": [],
            "employees": [{"id": "old", "name": "Old Timer", "title": "", "company": "Acme",
                           "company_id": "acme123", "department": "", "location": "",
                           "linkedin_url": "", "profile_image_url": ""}],
        });
        let mut record = StoredRecord::new(key.clone(), "Acme", payload);
        record.stored_at = Utc::now() - Duration::hours(30);
        db.upsert(Collection::EmployeeCache, &key, record).await.unwrap();

        let search = FakeSearch::new(vec![Ok(three_countries())]);
        let resolved = resolve_employees(&db, &search, "acme123", "engineer", &[]).await.unwrap();

        assert_eq!(resolved.origin, Origin::Network);
        assert_eq!(resolved.value.len(), 3);
        assert_eq!(search.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_results_not_cached() {
        let db = Database::open_in_memory().unwrap();
        let search = FakeSearch::new(vec![Ok(json!({"people": []})), Ok(json!({"people": []}))]);

        let first = resolve_employees(&db, &search, "acme123", "astronaut", &[]).await.unwrap();
        assert!(first.value.is_empty());
        resolve_employees(&db, &search, "acme123", "astronaut", &[]).await.unwrap();
        assert_eq!(search.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cache_uses_first_company_name_and_clears_selection() {
        let db = Database::open_in_memory().unwrap();
        let search = FakeSearch::new(vec![Ok(three_countries())]);
        resolve_employees(&db, &search, "acme123", "engineer", &[]).await.unwrap();

        let filter = Filter::EmployeeKey {
            company_id: "acme123".to_string(),
            query: "engineer".to_string(),
            regions: vec![],
        };
        let stored = db.get(Collection::EmployeeCache, &filter).await.unwrap().unwrap();
        assert_eq!(stored.name, "Acme");
        assert!(stored.payload["employees"]
            .as_array()
            .unwrap()
            .iter()
            .all(|e| e["selected"] == json!(false)));
    }

    #[tokio::test]
    async fn test_search_error_propagates() {
        let db = Database::open_in_memory().unwrap();
        let search = FakeSearch::new(vec![Err(LookupError::Upstream("timeout".to_string()))]);

        let err = resolve_employees(&db, &search, "acme123", "engineer", &[]).await.unwrap_err();
        assert!(matches!(err, LookupError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_unexpected_shape_is_parse_error() {
        let db = Database::open_in_memory().unwrap();
        let search = FakeSearch::new(vec![Ok(json!({"organizations": []}))]);

        let err = resolve_employees(&db, &search, "acme123", "engineer", &[]).await.unwrap_err();
        assert!(matches!(err, LookupError::Parse(_)));
    }

    #[tokio::test]
    async fn test_broken_store_falls_through_to_network() {
        let store = BrokenStore::default();
        let search = FakeSearch::new(vec![Ok(three_countries())]);

        let resolved = resolve_employees(&store, &search, "acme123", "engineer", &[]).await.unwrap();
        assert_eq!(resolved.value.len(), 3);
    }
}
