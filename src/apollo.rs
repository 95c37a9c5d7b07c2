use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LookupError, LookupResult};
use crate::models::CompanyRecord;

pub const DEFAULT_SEARCH_URL: &str = "http://localhost:8080/api/proxy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Endpoint {
    #[serde(rename = "mixed_companies/search")]
    CompanySearch,
    #[serde(rename = "mixed_people/search")]
    PeopleSearch,
    #[serde(rename = "people/bulk_match")]
    BulkMatch,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::CompanySearch => "mixed_companies/search",
            Endpoint::PeopleSearch => "mixed_people/search",
            Endpoint::BulkMatch => "people/bulk_match",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PersonOrganization {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// A person as returned by people search and bulk match. Every field may be
/// missing or null.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Person {
    pub id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub name: Option<String>,
    pub linkedin_url: Option<String>,
    pub title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub subdepartments: Option<Vec<String>>,
    pub organization: Option<PersonOrganization>,
    pub twitter_url: Option<String>,
    pub country: Option<String>,
    pub photo_url: Option<String>,
}

impl Person {
    pub fn organization_name(&self) -> Option<&str> {
        self.organization.as_ref().and_then(|o| o.name.as_deref())
    }

    pub fn organization_id(&self) -> Option<&str> {
        self.organization.as_ref().and_then(|o| o.id.as_deref())
    }
}

/// The three response shapes the search service produces.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchResponse {
    Organizations(Vec<CompanyRecord>),
    People(Vec<Person>),
    Matches(Vec<Person>),
}

impl SearchResponse {
    /// Validate a response body. A body carrying none of the known lists is
    /// rejected rather than read as empty.
    pub fn from_value(mut body: Value) -> LookupResult<Self> {
        let Some(obj) = body.as_object_mut() else {
            return Err(LookupError::Parse("search response is not a JSON object".to_string()));
        };

        if let Some(orgs) = obj.remove("organizations") {
            let orgs: Vec<CompanyRecord> = serde_json::from_value(orgs)
                .map_err(|e| LookupError::Parse(format!("bad organizations list: {}", e)))?;
            return Ok(SearchResponse::Organizations(orgs));
        }

        if let Some(people) = obj.remove("people") {
            let people: Vec<Person> = serde_json::from_value(people)
                .map_err(|e| LookupError::Parse(format!("bad people list: {}", e)))?;
            return Ok(SearchResponse::People(people));
        }

        if let Some(matches) = obj.remove("matches") {
            // Bulk match reports unmatched entries as null
            let matches: Vec<Option<Person>> = serde_json::from_value(matches)
                .map_err(|e| LookupError::Parse(format!("bad matches list: {}", e)))?;
            return Ok(SearchResponse::Matches(matches.into_iter().flatten().collect()));
        }

        let keys: Vec<&String> = obj.keys().collect();
        Err(LookupError::Parse(format!("unrecognized search response with keys {:?}", keys)))
    }

    pub fn into_organizations(self) -> LookupResult<Vec<CompanyRecord>> {
        match self {
            SearchResponse::Organizations(orgs) => Ok(orgs),
            other => Err(other.mismatch("organizations")),
        }
    }

    pub fn into_people(self) -> LookupResult<Vec<Person>> {
        match self {
            SearchResponse::People(people) => Ok(people),
            other => Err(other.mismatch("people")),
        }
    }

    pub fn into_matches(self) -> LookupResult<Vec<Person>> {
        match self {
            SearchResponse::Matches(matches) => Ok(matches),
            other => Err(other.mismatch("matches")),
        }
    }

    fn mismatch(&self, expected: &str) -> LookupError {
        let got = match self {
            SearchResponse::Organizations(_) => "organizations",
            SearchResponse::People(_) => "people",
            SearchResponse::Matches(_) => "matches",
        };
        LookupError::Parse(format!("expected {} in search response, got {}", expected, got))
    }
}

#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(&self, endpoint: Endpoint, params: Value) -> LookupResult<SearchResponse>;
}

#[derive(Debug, Serialize)]
struct ProxyRequest<'a> {
    endpoint: Endpoint,
    params: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ProxyError {
    error: Option<String>,
    message: Option<String>,
}

/// Client for the search proxy, which forwards `{endpoint, params}` to the
/// people-data API.
#[derive(Debug, Clone)]
pub struct ProxySearchClient {
    url: String,
    client: reqwest::Client,
}

impl ProxySearchClient {
    pub fn new(url: &str) -> Self {
        Self::with_client(url, reqwest::Client::new())
    }

    pub fn with_client(url: &str, client: reqwest::Client) -> Self {
        Self {
            url: url.to_string(),
            client,
        }
    }
}

#[async_trait]
impl SearchService for ProxySearchClient {
    async fn search(&self, endpoint: Endpoint, params: Value) -> LookupResult<SearchResponse> {
        tracing::debug!(endpoint = endpoint.as_str(), "search request");

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&ProxyRequest {
                endpoint,
                params: &params,
            })
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            // Error bodies are not guaranteed to be JSON
            let detail = serde_json::from_str::<ProxyError>(&text)
                .ok()
                .and_then(|e| e.error.or(e.message))
                .unwrap_or_else(|| text.chars().take(200).collect());
            return Err(LookupError::Upstream(format!(
                "{} failed with status {}: {}",
                endpoint.as_str(),
                status,
                detail
            )));
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| LookupError::Parse(format!("{} returned invalid JSON: {}", endpoint.as_str(), e)))?;
        SearchResponse::from_value(body)
    }
}
