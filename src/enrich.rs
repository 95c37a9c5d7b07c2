use serde::Serialize;
use serde_json::json;

use crate::apollo::{Endpoint, Person, SearchService};
use crate::error::LookupResult;
use crate::models::{EmployeeDetail, EmployeeSummary};

/// Upper bound the bulk-match endpoint accepts per call. Not enforced here;
/// callers chunk their batches.
pub const BULK_MATCH_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchDetail {
    pub first_name: String,
    pub last_name: String,
    pub organization_name: String,
    pub title: String,
    pub linkedin_url: String,
}

/// First whitespace-separated token, and everything after it joined by single
/// spaces.
pub fn split_name(name: &str) -> (String, String) {
    let mut parts = name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

pub fn match_detail(emp: &EmployeeSummary) -> MatchDetail {
    let (first_name, last_name) = split_name(&emp.name);
    MatchDetail {
        first_name,
        last_name,
        organization_name: emp.company.clone(),
        title: emp.title.clone(),
        linkedin_url: emp.linkedin_url.clone(),
    }
}

// --- Identity matchers, highest priority first ---

pub type Matcher = fn(&EmployeeSummary, &Person) -> bool;

fn full_name(person: &Person) -> String {
    [person.first_name.as_deref(), person.last_name.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_lowercase()
}

pub fn same_full_name(emp: &EmployeeSummary, person: &Person) -> bool {
    let wanted = emp.name.trim().to_lowercase();
    !wanted.is_empty() && wanted == full_name(person)
}

pub fn same_linkedin_url(emp: &EmployeeSummary, person: &Person) -> bool {
    !emp.linkedin_url.is_empty() && person.linkedin_url.as_deref() == Some(emp.linkedin_url.as_str())
}

pub fn same_company_and_title(emp: &EmployeeSummary, person: &Person) -> bool {
    !emp.company.is_empty()
        && !emp.title.is_empty()
        && person.organization_name() == Some(emp.company.as_str())
        && person.title.as_deref() == Some(emp.title.as_str())
}

pub const MATCHERS: [(&str, Matcher); 3] = [
    ("full_name", same_full_name),
    ("linkedin_url", same_linkedin_url),
    ("company_and_title", same_company_and_title),
];

/// First result, in service order, that satisfies any matcher. The label is
/// the first matcher in `MATCHERS` that accepted it.
pub fn find_match<'a>(emp: &EmployeeSummary, matches: &'a [Person]) -> Option<(&'static str, &'a Person)> {
    matches.iter().find_map(|person| {
        MATCHERS
            .iter()
            .find(|(_, matcher)| matcher(emp, person))
            .map(|(label, _)| (*label, person))
    })
}

pub fn build_detail(emp: EmployeeSummary, found: Option<&Person>) -> EmployeeDetail {
    let (email, phone, twitter_url, skills) = match found {
        Some(person) => (
            person.email.clone().unwrap_or_default(),
            person.phone.clone().unwrap_or_default(),
            person.twitter_url.clone().unwrap_or_default(),
            person.subdepartments.clone().unwrap_or_default(),
        ),
        None => Default::default(),
    };

    EmployeeDetail {
        summary: emp,
        email,
        phone,
        twitter_url,
        skills,
        // The search service has no employment history to offer
        experience: Vec::new(),
    }
}

/// Attach contact details to each employee with a single bulk-match call.
/// Any failure fails the whole batch.
pub async fn enrich(search: &dyn SearchService, employees: Vec<EmployeeSummary>) -> LookupResult<Vec<EmployeeDetail>> {
    if employees.is_empty() {
        return Ok(Vec::new());
    }

    let details: Vec<MatchDetail> = employees.iter().map(match_detail).collect();
    tracing::info!(count = details.len(), "fetching contact details");

    let matches = search
        .search(Endpoint::BulkMatch, json!({ "details": details }))
        .await?
        .into_matches()?;

    let enriched = employees
        .into_iter()
        .map(|emp| {
            let found = find_match(&emp, &matches);
            match found {
                Some((matcher, _)) => tracing::debug!(employee = %emp.name, matcher, "matched contact"),
                None => tracing::debug!(employee = %emp.name, "no contact match"),
            }
            build_detail(emp, found.map(|(_, person)| person))
        })
        .collect();

    Ok(enriched)
}
