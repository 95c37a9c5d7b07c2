mod ai;
mod apollo;
mod companies;
mod config;
mod db;
mod employees;
mod enrich;
mod error;
mod models;
mod relevance;
mod session;
#[cfg(test)]
mod testing;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use apollo::ProxySearchClient;
use config::Config;
use db::Database;
use models::{Company, EmployeeDetail, EmployeeSummary, EmployeeType};
use session::Session;

const MAX_COMPANIES: usize = 10;

#[derive(Parser)]
#[command(name = "prospect")]
#[command(about = "Find people at target companies, pick the relevant ones, and pull their contact details")]
struct Cli {
    /// Path to the cache database (defaults to PROSPECT_DB or the user data dir)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Search proxy URL (defaults to PROSPECT_SEARCH_URL)
    #[arg(long, global = true)]
    search_url: Option<String>,

    /// Completion provider: proxy, openai, anthropic (defaults to PROSPECT_AI_PROVIDER)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Debug-level logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the cache database
    Init,

    /// Resolve a company name to its canonical record
    Company {
        /// Company name or LinkedIn company URL
        name: String,

        /// Restrict to companies located in these countries
        #[arg(short, long = "country")]
        countries: Vec<String>,
    },

    /// List employees of one or more companies
    Employees {
        /// Company names or LinkedIn company URLs (up to 10)
        #[arg(required = true)]
        companies: Vec<String>,

        /// Role or keyword query
        #[arg(short, long, default_value = "")]
        query: String,

        /// Only keep employees located in these countries
        #[arg(short, long = "country")]
        countries: Vec<String>,

        /// Which employees to look for
        #[arg(long, value_enum, default_value = "current")]
        employee_type: EmployeeType,

        /// Let the language model pick the most relevant employees
        #[arg(long)]
        ai: bool,

        /// Select employees by id (repeatable)
        #[arg(short, long = "pick")]
        picks: Vec<String>,

        /// Fetch contact details for the selected employees
        #[arg(short, long)]
        details: bool,
    },

    /// Delete all cached employee results
    ClearCache,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "prospect=debug" } else { "prospect=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_database(config: &Config) -> Result<Database> {
    let db = match &config.db_path {
        Some(path) => Database::open_at(path),
        None => Database::open(),
    }
    .context("Failed to open cache database")?;
    Ok(db)
}

fn build_session(config: &Config, db: Database) -> Result<Session> {
    let kind = ai::resolve_provider(&config.provider)?;
    let completion = ai::create_provider(kind, config)?;
    Ok(Session::new(
        Arc::new(db),
        Arc::new(ProxySearchClient::new(&config.search_url)),
        Arc::from(completion),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::from_env();
    if let Some(db) = cli.db {
        config.db_path = Some(db);
    }
    if let Some(url) = cli.search_url {
        config.search_url = url;
    }
    if let Some(provider) = cli.provider {
        config.provider = provider;
    }

    let db = open_database(&config)?;

    match cli.command {
        Commands::Init => {
            db.init()?;
            let path = db.path().cloned().unwrap_or_else(Database::default_path);
            println!("Database initialized at {}", path.display());
        }

        Commands::Company { name, countries } => {
            db.ensure_initialized()?;
            let session = build_session(&config, db)?;
            let resolved = session.resolve_company(&name, &countries).await?;
            let company = &resolved.value;
            println!("Company: {}", company.name);
            println!("ID: {}", company.id);
            if let Some(website) = &company.website_url {
                println!("Website: {}", website);
            }
            if let Some(linkedin) = &company.linkedin_url {
                println!("LinkedIn: {}", linkedin);
            }
            if resolved.from_cache() {
                println!("(from cache)");
            }
        }

        Commands::Employees {
            companies,
            query,
            countries,
            employee_type,
            ai,
            picks,
            details,
        } => {
            if companies.len() > MAX_COMPANIES {
                bail!("At most {} companies per search", MAX_COMPANIES);
            }
            db.ensure_initialized()?;
            let session = build_session(&config, db)?;

            for name in companies {
                let mut company = Company::new(&name, countries.clone(), &query);
                company.employee_type = employee_type;
                let employees = fetch_employees(&session, &mut company).await;
                if employees.is_empty() {
                    continue;
                }

                let mut employees = if ai {
                    session.select_relevant(employees, &company.query).await
                } else {
                    let mut employees = employees;
                    models::clear_selection(&mut employees);
                    employees
                };
                for id in &picks {
                    models::toggle_selection(&mut employees, id);
                }

                print_employees(&employees);

                let chosen = models::selected(&employees);
                if details {
                    if chosen.is_empty() {
                        println!("No employees selected. Use --ai or --pick to choose some.");
                    } else {
                        show_details(&session, chosen).await?;
                    }
                }
            }
        }

        Commands::ClearCache => {
            db.ensure_initialized()?;
            let session = build_session(&config, db)?;
            session.clear_cache().await.context("Failed to clear cache")?;
            println!("Cache cleared.");
        }
    }

    Ok(())
}

/// Resolve the company and its employees. Failures are reported and turn into
/// an empty list so the remaining companies still get processed.
async fn fetch_employees(session: &Session, company: &mut Company) -> Vec<EmployeeSummary> {
    let record = match session.resolve_company(&company.name, &company.countries).await {
        Ok(resolved) => resolved.value,
        Err(e) => {
            println!("Could not find company '{}': {}", company.name, e);
            return Vec::new();
        }
    };
    company.apply_canonical(&record);

    println!("\n== {} ({}, {:?} employees) ==", company.name, company.id, company.employee_type);
    match session
        .resolve_employees(&company.id, &company.query, &company.countries)
        .await
    {
        Ok(resolved) => {
            if resolved.from_cache() {
                println!("(using cached results)");
            }
            if resolved.value.is_empty() {
                println!("No employees found.");
            }
            resolved.value
        }
        Err(e) => {
            println!("Failed to fetch employees: {}", e);
            Vec::new()
        }
    }
}

async fn show_details(session: &Session, chosen: Vec<EmployeeSummary>) -> Result<()> {
    let mut all: Vec<EmployeeDetail> = Vec::new();
    for batch in chosen.chunks(enrich::BULK_MATCH_LIMIT) {
        let enriched = session
            .enrich(batch.to_vec())
            .await
            .context("Failed to fetch contact details")?;
        all.extend(enriched);
    }

    for detail in all {
        let emp = &detail.summary;
        println!("\n{} - {}", emp.name, emp.title);
        if !emp.company.is_empty() {
            println!("  Company:  {}", emp.company);
        }
        if !emp.location.is_empty() {
            println!("  Location: {}", emp.location);
        }
        println!("  Email:    {}", or_dash(&detail.email));
        println!("  Phone:    {}", or_dash(&detail.phone));
        if !emp.linkedin_url.is_empty() {
            println!("  LinkedIn: {}", emp.linkedin_url);
        }
        if !detail.twitter_url.is_empty() {
            println!("  Twitter:  {}", detail.twitter_url);
        }
        if !detail.skills.is_empty() {
            println!("  Skills:   {}", detail.skills.join(", "));
        }
    }
    Ok(())
}

fn print_employees(employees: &[EmployeeSummary]) {
    println!("{:<3} {:<26} {:<24} {:<30} {:<16}", "SEL", "ID", "NAME", "TITLE", "LOCATION");
    println!("{}", "-".repeat(102));
    for emp in employees {
        println!(
            "{:<3} {:<26} {:<24} {:<30} {:<16}",
            if emp.selected { "*" } else { "" },
            truncate(&emp.id, 24),
            truncate(&emp.name, 22),
            truncate(&emp.title, 28),
            truncate(&emp.location, 14)
        );
    }
    let count = employees.iter().filter(|e| e.selected).count();
    println!("{} employees, {} selected", employees.len(), count);
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
