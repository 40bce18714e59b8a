mod auth;
mod cache;
mod config;
mod db;
mod error;
mod filter;
mod models;
mod pipeline;
mod session;
mod stats;
mod store;
mod tui;
mod validate;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use auth::{ConfiguredIdentity, IdentityProvider};
use cache::LocalCache;
use config::Config;
use db::Database;
use filter::{FilterState, Selection};
use models::{ApplicationPatch, ApplicationRecord, Assessment, Decision, Interview, NewApplication, Response};
use pipeline::{derived_stage, evaluate_staleness, stage_visibility, STALE_AFTER_DAYS};
use session::Session;

#[derive(Parser)]
#[command(name = "jobtrack")]
#[command(about = "Track job applications through assessment, interview and decision")]
struct Cli {
    /// Config file (defaults to config.toml in the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path, overriding the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Record a new application
    Add {
        /// Job title
        title: String,

        /// Company name
        company: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Link to the job posting
        #[arg(short, long, default_value = "")]
        link: String,

        /// Date applied (YYYY-MM-DD), defaults to today
        #[arg(short, long, value_parser = validate::parse_date)]
        applied: Option<NaiveDate>,
    },

    /// List applications
    List {
        #[command(flatten)]
        filter: FilterArgs,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show application details
    Show {
        /// Application id or unique prefix
        id: String,
    },

    /// Change the title, company, description, link or applied date
    Edit {
        /// Application id or unique prefix
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        company: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        link: Option<String>,

        #[arg(long, value_parser = validate::parse_date)]
        applied: Option<NaiveDate>,
    },

    /// Move an application through the pipeline
    Update {
        /// Application id or unique prefix
        id: String,

        /// waiting, assessment, interview, rejection, no_response
        #[arg(short, long)]
        response: Option<Response>,

        /// Date the employer responded (YYYY-MM-DD)
        #[arg(long, value_parser = validate::parse_date, conflicts_with = "clear_response_date")]
        response_date: Option<NaiveDate>,

        /// Remove the stored response date
        #[arg(long)]
        clear_response_date: bool,

        /// pending, passed, failed, n/a
        #[arg(short, long)]
        assessment: Option<Assessment>,

        /// pending, scheduled, not_scheduled
        #[arg(short, long)]
        interview: Option<Interview>,

        /// pending, rejected, offered
        #[arg(short = 'D', long)]
        decision: Option<Decision>,
    },

    /// Delete an application
    Delete {
        /// Application id or unique prefix
        id: String,
    },

    /// Show summary statistics
    Stats {
        #[command(flatten)]
        filter: FilterArgs,

        #[arg(long)]
        json: bool,
    },

    /// List applications waiting longer than the staleness threshold
    Stale {
        /// Mark them as no response
        #[arg(long)]
        apply: bool,
    },

    /// Move applications from the local session into the signed-in account
    Migrate,

    /// Browse and update applications interactively
    Browse {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Show the current identity
    Whoami,
}

#[derive(Args)]
struct FilterArgs {
    /// Response filter (all, waiting, assessment, interview, rejection, no_response)
    #[arg(long, default_value = "all")]
    response: Selection<Response>,

    /// Decision filter (all, pending, rejected, offered)
    #[arg(long, default_value = "all")]
    decision: Selection<Decision>,

    /// Assessment filter (all, pending, passed, failed, n/a)
    #[arg(long, default_value = "all")]
    assessment: Selection<Assessment>,

    /// Interview filter (all, pending, scheduled, not_scheduled)
    #[arg(long, default_value = "all")]
    interview: Selection<Interview>,
}

impl FilterArgs {
    fn state(&self) -> FilterState {
        FilterState {
            response: self.response,
            decision: self.decision,
            assessment: self.assessment,
            interview: self.interview,
        }
    }
}

fn init_logging(config: &Config) {
    let filter = match config.log.as_deref() {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jobtrack=warn")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// The active session plus, when nobody is signed in, the cache it persists to.
struct Workspace {
    session: Session,
    cache: Option<LocalCache>,
}

impl Workspace {
    fn open(config: &Config, today: NaiveDate) -> Result<Self> {
        let identity = ConfiguredIdentity::new(config.identity.clone());
        let (mut session, cache) = match identity.current() {
            Some(identity) => {
                let db = Database::open(&config.database_path())?;
                db.ensure_initialized()?;
                (Session::open(Box::new(db), identity)?, None)
            }
            None => {
                let cache = LocalCache::new(config.cache_path());
                let records = cache.load_or_discard()?;
                (Session::anonymous(records), Some(cache))
            }
        };

        let report = session.apply_staleness_policy(config.staleness, today);
        let workspace = Self { session, cache };
        if !report.reclassified.is_empty() {
            workspace.save()?;
        }
        Ok(workspace)
    }

    /// Persist the anonymous session. Signed-in sessions are already stored.
    fn save(&self) -> Result<()> {
        if let Some(cache) = &self.cache {
            cache
                .save(self.session.records())
                .with_context(|| format!("Failed to save local session: {}", cache.path().display()))?;
            debug!(path = %cache.path().display(), "saved local session");
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database = Some(db);
    }
    init_logging(&config);
    let today = chrono::Local::now().date_naive();

    match cli.command {
        Commands::Init => {
            let db = Database::open(&config.database_path())?;
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Add {
            title,
            company,
            description,
            link,
            applied,
        } => {
            let mut ws = Workspace::open(&config, today)?;
            let form = NewApplication {
                title,
                company,
                description,
                job_link: link,
                applied_date: applied.unwrap_or(today),
            };
            let id = ws.session.add(form, today)?.id.clone();
            ws.save()?;
            println!("Added application {}", short_id(&id));
        }

        Commands::List { filter, json } => {
            let ws = Workspace::open(&config, today)?;
            let records = ws.session.filtered(&filter.state());
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No applications found.");
            } else {
                print_table(&records, ws.session.records());
            }
        }

        Commands::Show { id } => {
            let ws = Workspace::open(&config, today)?;
            let record = ws.session.resolve(&id)?;
            print_record(record, today);
        }

        Commands::Edit {
            id,
            title,
            company,
            description,
            link,
            applied,
        } => {
            let mut ws = Workspace::open(&config, today)?;
            let record = ws.session.resolve(&id)?;
            let id = record.id.clone();
            let mut form = record.form();
            if let Some(title) = title {
                form.title = title;
            }
            if let Some(company) = company {
                form.company = company;
            }
            if let Some(description) = description {
                form.description = description;
            }
            if let Some(link) = link {
                form.job_link = link;
            }
            if let Some(applied) = applied {
                form.applied_date = applied;
            }
            ws.session.edit(&id, form, today)?;
            ws.save()?;
            println!("Updated application {}", short_id(&id));
        }

        Commands::Update {
            id,
            response,
            response_date,
            clear_response_date,
            assessment,
            interview,
            decision,
        } => {
            let mut ws = Workspace::open(&config, today)?;
            let id = ws.session.resolve(&id)?.id.clone();

            let mut patch = ApplicationPatch::new();
            if let Some(response) = response {
                patch = patch.response(response);
            }
            if let Some(date) = response_date {
                patch = patch.response_date(Some(date));
            }
            if clear_response_date {
                patch = patch.response_date(None);
            }
            if let Some(assessment) = assessment {
                patch = patch.assessment(assessment);
            }
            if let Some(interview) = interview {
                patch = patch.interview(interview);
            }
            if let Some(decision) = decision {
                patch = patch.decision(decision);
            }
            if patch.is_empty() {
                bail!("Nothing to update. Pass at least one of --response, --response-date, --assessment, --interview, --decision");
            }

            ws.session.update(&id, patch, today)?;
            ws.save()?;
            if let Some(record) = ws.session.get(&id) {
                println!("{} is now: {}", short_id(&id), derived_stage(record));
            }
        }

        Commands::Delete { id } => {
            let mut ws = Workspace::open(&config, today)?;
            let id = ws.session.resolve(&id)?.id.clone();
            let removed = ws.session.delete(&id)?;
            ws.save()?;
            println!("Deleted '{}' at {}", removed.title, removed.company);
        }

        Commands::Stats { filter, json } => {
            let ws = Workspace::open(&config, today)?;
            let summary = stats::aggregate(ws.session.filtered(&filter.state()));
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Applications:       {}", summary.total);
                println!("Active:             {}", summary.active);
                println!("Awaiting response:  {}", summary.awaiting_response);
                println!("Responded:          {} ({}%)", summary.responded, summary.response_rate);
                println!("Pending assessment: {}", summary.pending_assessment);
                println!("Assessment passed:  {}", summary.assessment_passed);
                println!("No assessment:      {}", summary.no_assessment_required);
                println!("Awaiting interview: {}", summary.awaiting_interview);
                println!("Interviewed:        {} ({}%)", summary.interviewed, summary.interview_rate);
                println!("Offers:             {}", summary.offered);
                println!("Rejected:           {}", summary.rejected);
            }
        }

        Commands::Stale { apply } => {
            let mut ws = Workspace::open(&config, today)?;
            if apply {
                let report = ws.session.reconcile_staleness(today);
                ws.save()?;
                println!("Marked {} application(s) as no response", report.reclassified.len());
                if !report.failed.is_empty() {
                    println!("Failed to update {}:", report.failed.len());
                    for id in &report.failed {
                        println!("  {}", short_id(id));
                    }
                }
            } else {
                let candidates = ws.session.stale_candidates(today);
                if candidates.is_empty() {
                    println!("No applications waiting longer than {} days.", STALE_AFTER_DAYS);
                } else {
                    println!("{:<10} {:<12} {:>5} {:<30} {:<20}", "ID", "APPLIED", "DAYS", "TITLE", "COMPANY");
                    println!("{}", "-".repeat(81));
                    for (id, _) in &candidates {
                        let Some(record) = ws.session.get(id) else { continue };
                        println!(
                            "{:<10} {:<12} {:>5} {:<30} {:<20}",
                            short_id(id),
                            record.applied_date,
                            (today - record.applied_date).num_days(),
                            truncate(&record.title, 28),
                            truncate(&record.company, 18)
                        );
                    }
                    println!("\nRun 'jobtrack stale --apply' to mark them as no response.");
                }
            }
        }

        Commands::Migrate => {
            let mut ws = Workspace::open(&config, today)?;
            if ws.session.is_anonymous() {
                bail!("Not signed in. Set an identity in the config or JOBTRACK_USER_ID before migrating.");
            }
            let cache = LocalCache::new(config.cache_path());
            let report = cache::migrate(&cache, &mut ws.session, today)?;
            if report.migrated == 0 && report.failed == 0 {
                println!("No local applications to migrate.");
            } else {
                println!("Migrated {} application(s)", report.migrated);
                if report.failed > 0 {
                    println!(
                        "{} application(s) could not be migrated and remain in {}",
                        report.failed,
                        cache.path().display()
                    );
                }
            }
        }

        Commands::Browse { filter } => {
            let mut ws = Workspace::open(&config, today)?;
            let result = tui::run_browse(&mut ws.session, filter.state(), today);
            ws.save()?;
            result?;
        }

        Commands::Whoami => match ConfiguredIdentity::new(config.identity.clone()).current() {
            Some(identity) => {
                println!("User:     {}", identity.user_id);
                if !identity.display_name.is_empty() {
                    println!("Name:     {}", identity.display_name);
                }
                if !identity.email.is_empty() {
                    println!("Email:    {}", identity.email);
                }
                println!("Database: {}", config.database_path().display());
            }
            None => {
                println!("Not signed in (local session)");
                println!("Cache: {}", config.cache_path().display());
            }
        },
    }

    Ok(())
}

fn print_table(records: &[&ApplicationRecord], all: &[ApplicationRecord]) {
    let visible = stage_visibility(all);

    let mut header = format!("{:<10} {:<12} {:<20} {:<28} {:<18}", "ID", "APPLIED", "STAGE", "TITLE", "COMPANY");
    if visible.assessment {
        header.push_str(&format!(" {:<10}", "ASSESSMENT"));
    }
    if visible.interview {
        header.push_str(&format!(" {:<13}", "INTERVIEW"));
    }
    if visible.outcome {
        header.push_str(&format!(" {:<11}", "DECISION"));
    }
    println!("{}", header);
    println!("{}", "-".repeat(header.len()));

    for record in records {
        let mut line = format!(
            "{:<10} {:<12} {:<20} {:<28} {:<18}",
            short_id(&record.id),
            record.applied_date,
            derived_stage(record).label(),
            truncate(&record.title, 26),
            truncate(&record.company, 16)
        );
        if visible.assessment {
            line.push_str(&format!(" {:<10}", record.assessment));
        }
        if visible.interview {
            line.push_str(&format!(" {:<13}", record.interview));
        }
        if visible.outcome {
            line.push_str(&format!(" {:<11}", record.decision));
        }
        println!("{}", line);
    }
}

fn print_record(record: &ApplicationRecord, today: NaiveDate) {
    println!("Application {}", record.id);
    println!("Title: {}", record.title);
    println!("Company: {}", record.company);
    if !record.job_link.is_empty() {
        println!("Link: {}", record.job_link);
    }
    println!("Applied: {}", record.applied_date);
    println!("Stage: {}", derived_stage(record));
    println!("Response: {}", record.response);
    if let Some(date) = record.response_date {
        println!("Response date: {}", date);
    }
    println!("Assessment: {}", record.assessment);
    println!("Interview: {}", record.interview);
    println!("Decision: {}", record.decision);
    if record.decision == Decision::Pending && evaluate_staleness(record, today).is_some() {
        println!(
            "\nNo response after {} days. Run 'jobtrack stale --apply' to mark it as no response.",
            (today - record.applied_date).num_days()
        );
    }
    if !record.description.is_empty() {
        println!("\n--- Description ---\n{}", record.description);
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
