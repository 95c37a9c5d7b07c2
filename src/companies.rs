use chrono::Utc;
use serde_json::{json, Value};

use crate::apollo::{Endpoint, SearchService};
use crate::db::{Collection, Filter, RecordStore, StoredRecord};
use crate::error::{LookupError, LookupResult};
use crate::models::{CompanyRecord, Resolved};

/// Users often paste a LinkedIn company page instead of a name. The page slug
/// is a better search term than the whole URL.
pub fn company_search_name(input: &str) -> String {
    let input = input.trim();
    let re = match regex::Regex::new(r"(?i)linkedin\.com/company/([^/?#]+)") {
        Ok(re) => re,
        Err(_) => return input.to_string(),
    };
    re.captures(input)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| input.to_string())
}

pub fn company_search_params(name: &str, countries: &[String]) -> Value {
    json!({
        "q_organization_name": name,
        "organization_locations": countries,
    })
}

async fn cached_company(store: &dyn RecordStore, name: &str) -> Option<CompanyRecord> {
    let record = match store.get(Collection::Companies, &Filter::NameLike(name.to_string())).await {
        Ok(Some(record)) => record,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(error = %e, company = name, "company cache read failed, treating as miss");
            return None;
        }
    };

    if !record.is_fresh(Utc::now()) {
        tracing::debug!(company = name, stored_at = %record.stored_at, "cached company is stale");
        return None;
    }

    match serde_json::from_value(record.payload) {
        Ok(company) => Some(company),
        Err(e) => {
            tracing::warn!(error = %e, company = name, "cached company payload unreadable");
            None
        }
    }
}

async fn save_company(store: &dyn RecordStore, company: &CompanyRecord) {
    let payload = match serde_json::to_value(company) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "could not serialize company for cache");
            return;
        }
    };
    let record = StoredRecord::new(company.id.clone(), company.name.clone(), payload);
    if let Err(e) = store.upsert(Collection::Companies, &company.id, record).await {
        tracing::warn!(error = %e, company = %company.name, "failed to cache company");
    }
}

/// Resolve a company name to the search service's canonical record, serving
/// a fresh cached record when one matches.
pub async fn resolve_company(
    store: &dyn RecordStore,
    search: &dyn SearchService,
    name: &str,
    countries: &[String],
) -> LookupResult<Resolved<CompanyRecord>> {
    let name = company_search_name(name);
    if name.is_empty() {
        return Err(LookupError::InvalidInput("company name is empty".to_string()));
    }

    if let Some(company) = cached_company(store, &name).await {
        tracing::info!(company = %company.name, "using cached company data");
        return Ok(Resolved::cached(company));
    }

    tracing::info!(company = %name, "no cached company, searching");
    let organizations = search
        .search(Endpoint::CompanySearch, company_search_params(&name, countries))
        .await?
        .into_organizations()?;

    let company = organizations
        .into_iter()
        .next()
        .ok_or_else(|| LookupError::NotFound(format!("no company matching '{}'", name)))?;

    save_company(store, &company).await;
    Ok(Resolved::fetched(company))
}
