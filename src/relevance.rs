use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;

use crate::ai::CompletionService;
use crate::models::EmployeeSummary;

pub const MAX_SELECTED: usize = 10;

/// Outcome of asking the completion service. A fallback carries the reason
/// the model's answer could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Ranked(Vec<String>),
    Fallback(String),
}

#[derive(Serialize)]
struct EmployeeBrief<'a> {
    id: &'a str,
    name: &'a str,
    title: &'a str,
    department: &'a str,
    location: &'a str,
}

pub fn build_prompt(employees: &[EmployeeSummary], query: &str) -> String {
    let briefs: Vec<EmployeeBrief> = employees
        .iter()
        .map(|e| EmployeeBrief {
            id: &e.id,
            name: &e.name,
            title: &e.title,
            department: &e.department,
            location: &e.location,
        })
        .collect();
    let listing = serde_json::to_string_pretty(&briefs).unwrap_or_else(|_| "[]".to_string());

    format!(
        "You are an AI assistant helping to identify the most relevant employees for a specific query.\n\n\
        QUERY: \"{query}\"\n\n\
        Below is a list of employees with their titles, departments, and locations:\n\
        {listing}\n\n\
        Based on the query, select the employee IDs that are most relevant.\n\
        Consider the following factors:\n\
        1. Job title relevance to the query\n\
        2. Department relevance\n\
        3. Seniority level when applicable\n\
        4. Select a diverse range of employees that would be most valuable for the query\n\n\
        Return ONLY a JSON array of employee IDs without any additional text or explanation.\n\
        Example response format: [\"id1\", \"id2\", \"id3\"]\n\n\
        Select at most {MAX_SELECTED} employees. If there are fewer relevant matches, select fewer."
    )
}

fn ids_from_json(text: &str) -> Result<Vec<String>, String> {
    let values: Vec<Value> = serde_json::from_str(text).map_err(|e| e.to_string())?;
    values
        .into_iter()
        .map(|v| match v {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(format!("unexpected id {}", other)),
        })
        .collect()
}

/// Read the id list out of a completion. The whole text is tried first, then
/// the first bracketed list inside it.
pub fn parse_ids(text: &str) -> Result<Vec<String>, String> {
    let strict_err = match ids_from_json(text.trim()) {
        Ok(ids) => return Ok(ids),
        Err(e) => e,
    };

    let re = regex::Regex::new(r"(?s)\[.*?\]").map_err(|e| e.to_string())?;
    let Some(found) = re.find(text) else {
        return Err(format!("no JSON array in completion ({})", strict_err));
    };
    ids_from_json(found.as_str()).map_err(|e| format!("bracketed list is not an id array: {}", e))
}

pub async fn choose(completion: &dyn CompletionService, employees: &[EmployeeSummary], query: &str) -> Selection {
    let prompt = build_prompt(employees, query);
    let text = match completion.complete(&prompt).await {
        Ok(text) => text,
        Err(e) => return Selection::Fallback(e.to_string()),
    };
    match parse_ids(&text) {
        Ok(ids) => Selection::Ranked(ids),
        Err(e) => Selection::Fallback(e),
    }
}

/// Mark a pseudo-random sample of at most `MAX_SELECTED` employees.
pub fn random_pick<R: Rng + ?Sized>(employees: Vec<EmployeeSummary>, rng: &mut R) -> Vec<EmployeeSummary> {
    let mut order: Vec<usize> = (0..employees.len()).collect();
    order.shuffle(rng);
    order.truncate(MAX_SELECTED);

    employees
        .into_iter()
        .enumerate()
        .map(|(i, mut emp)| {
            emp.selected = order.contains(&i);
            emp
        })
        .collect()
}

pub fn apply_selection<R: Rng + ?Sized>(
    employees: Vec<EmployeeSummary>,
    selection: Selection,
    rng: &mut R,
) -> Vec<EmployeeSummary> {
    match selection {
        Selection::Ranked(ids) => employees
            .into_iter()
            .map(|mut emp| {
                emp.selected = ids.contains(&emp.id);
                emp
            })
            .collect(),
        Selection::Fallback(reason) => {
            tracing::warn!(%reason, "AI selection failed, falling back to a random pick");
            random_pick(employees, rng)
        }
    }
}

/// Ask the completion service which employees best fit `query`. Never fails:
/// any problem with the service degrades to a random pick.
pub async fn select_relevant(
    completion: &dyn CompletionService,
    employees: Vec<EmployeeSummary>,
    query: &str,
) -> Vec<EmployeeSummary> {
    if employees.is_empty() {
        return employees;
    }

    let selection = choose(completion, &employees, query).await;
    if let Selection::Ranked(ids) = &selection {
        tracing::info!(selected = ids.len(), model = completion.model_name(), "AI selected employees");
    }
    apply_selection(employees, selection, &mut rand::thread_rng())
}
