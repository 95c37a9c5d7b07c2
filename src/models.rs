use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EmployeeType {
    #[default]
    Current,
    Former,
    Both,
}

/// A company as entered by the user. `id` and `name` are replaced with the
/// search service's canonical values once the company is resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub countries: Vec<String>,
    pub employee_type: EmployeeType,
    pub query: String,
}

impl Company {
    pub fn new(name: &str, countries: Vec<String>, query: &str) -> Self {
        Self {
            id: String::new(),
            name: name.to_string(),
            countries,
            employee_type: EmployeeType::default(),
            query: query.to_string(),
        }
    }

    pub fn apply_canonical(&mut self, record: &CompanyRecord) {
        self.id = record.id.clone();
        self.name = record.name.clone();
    }
}

/// Organization record returned by the search service. Fields we don't model
/// are kept in `extra` so the cached payload round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmployeeSummary {
    pub id: String,
    pub name: String,
    pub title: String,
    pub company: String,
    pub company_id: String,
    pub department: String,
    pub location: String,
    pub linkedin_url: String,
    pub profile_image_url: String,
    #[serde(default)]
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experience {
    pub company: String,
    pub title: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeDetail {
    #[serde(flatten)]
    pub summary: EmployeeSummary,
    pub email: String,
    pub phone: String,
    pub twitter_url: String,
    pub skills: Vec<String>,
    pub experience: Vec<Experience>,
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache,
    Network,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub origin: Origin,
}

impl<T> Resolved<T> {
    pub fn cached(value: T) -> Self {
        Self {
            value,
            origin: Origin::Cache,
        }
    }

    pub fn fetched(value: T) -> Self {
        Self {
            value,
            origin: Origin::Network,
        }
    }

    pub fn from_cache(&self) -> bool {
        self.origin == Origin::Cache
    }
}

/// Flip the `selected` flag of the employee with the given id.
/// Returns false when no employee has that id.
pub fn toggle_selection(employees: &mut [EmployeeSummary], id: &str) -> bool {
    match employees.iter_mut().find(|e| e.id == id) {
        Some(emp) => {
            emp.selected = !emp.selected;
            true
        }
        None => false,
    }
}

pub fn clear_selection(employees: &mut [EmployeeSummary]) {
    for emp in employees.iter_mut() {
        emp.selected = false;
    }
}

pub fn selected(employees: &[EmployeeSummary]) -> Vec<EmployeeSummary> {
    employees.iter().filter(|e| e.selected).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employee(id: &str) -> EmployeeSummary {
        EmployeeSummary {
            id: id.to_string(),
            name: format!("Person {}", id),
            ..Default::default()
        }
    }

    #[test]
    fn test_toggle_selection() {
        let mut employees = vec![employee("a"), employee("b")];
        assert!(toggle_selection(&mut employees, "b"));
        assert!(!employees[0].selected);
        assert!(employees[1].selected);

        assert!(toggle_selection(&mut employees, "b"));
        assert!(!employees[1].selected);

        assert!(!toggle_selection(&mut employees, "missing"));
    }

    #[test]
    fn test_selected_and_clear() {
        let mut employees = vec![employee("a"), employee("b"), employee("c")];
        toggle_selection(&mut employees, "a");
        toggle_selection(&mut employees, "c");

        let picked: Vec<_> = selected(&employees).into_iter().map(|e| e.id).collect();
        assert_eq!(picked, vec!["a", "c"]);

        clear_selection(&mut employees);
        assert!(selected(&employees).is_empty());
    }

    #[test]
    fn test_company_record_keeps_unknown_fields() {
        let raw = serde_json::json!({
            "id": "org-1",
            "name": "Acme",
            "website_url": "https://acme.test",
            "estimated_num_employees": 120,
        });
        let record: CompanyRecord = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(record.id, "org-1");
        assert_eq!(record.linkedin_url, None);
        assert_eq!(record.extra.get("estimated_num_employees"), Some(&serde_json::json!(120)));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["estimated_num_employees"], 120);
    }

    #[test]
    fn test_apply_canonical() {
        let mut company = Company::new("acme", vec!["Germany".to_string()], "engineer");
        let record: CompanyRecord =
            serde_json::from_value(serde_json::json!({"id": "org-9", "name": "Acme Corp"})).unwrap();
        company.apply_canonical(&record);
        assert_eq!(company.id, "org-9");
        assert_eq!(company.name, "Acme Corp");
        assert_eq!(company.query, "engineer");
    }
}
