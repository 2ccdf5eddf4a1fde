//! ganttkit CLI entry point

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ganttkit::core::{SummaryStats, TaskFilter, TaskStatus};
use ganttkit::{
    Config, FileSessionStore, GanttPipeline, OAuthRefresher, RawDump, RequestExecutor, Session,
    SessionStore, UpstreamClient,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ganttkit", version, about = "Gantt rows and critical path from project-tracker tasks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print render rows for a saved upstream dump
    Rows {
        #[arg(short, long)]
        input: PathBuf,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Print summary counters for a saved upstream dump
    Stats {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Fetch tasks from the upstream service and print render rows
    Fetch {
        #[arg(long)]
        domain: String,
        /// Reuse a stored session instead of creating one
        #[arg(long)]
        session: Option<String>,
        #[arg(long, required_unless_present = "session")]
        access_token: Option<String>,
        #[arg(long)]
        refresh_token: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Also write the raw payloads to this file
        #[arg(long)]
        save: Option<PathBuf>,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// List stored sessions
    Sessions,
}

#[derive(Args, Default)]
struct ViewArgs {
    /// Collapsed row id (repeatable)
    #[arg(long = "collapsed")]
    collapsed: Vec<String>,
    #[arg(long)]
    search: Option<String>,
    /// Status code (2, 3, 4, 5, 7) or name (repeatable)
    #[arg(long = "status", value_parser = parse_status)]
    statuses: Vec<TaskStatus>,
    #[arg(long = "assignee")]
    assignees: Vec<String>,
    #[arg(long = "department")]
    departments: Vec<String>,
    #[arg(long = "project")]
    projects: Vec<String>,
    #[arg(long)]
    only_overdue: bool,
    #[arg(long)]
    only_critical: bool,
}

impl ViewArgs {
    fn filter(&self) -> TaskFilter {
        TaskFilter {
            search: self.search.clone(),
            date_range: None,
            statuses: self.statuses.iter().copied().collect(),
            assignees: self.assignees.iter().cloned().collect(),
            departments: self.departments.iter().cloned().collect(),
            projects: self.projects.iter().cloned().collect(),
            only_overdue: self.only_overdue,
            only_critical: self.only_critical,
        }
    }

    fn pipeline(&self, dump: &RawDump) -> GanttPipeline {
        GanttPipeline::new()
            .directory(dump.directory())
            .filter(self.filter())
            .collapsed(self.collapsed.iter().cloned())
    }
}

fn parse_status(raw: &str) -> std::result::Result<TaskStatus, String> {
    TaskStatus::from_code(raw)
        .or_else(|| serde_json::from_value(serde_json::Value::String(raw.to_string())).ok())
        .ok_or_else(|| format!("unknown status {:?}", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Rows { input, view } => {
            let dump = RawDump::from_file(&input)?;
            let gantt = view.pipeline(&dump).run_dump(&dump)?;
            println!("{}", serde_json::to_string_pretty(&gantt.rows)?);
        }
        Command::Stats { input } => {
            let dump = RawDump::from_file(&input)?;
            let gantt = GanttPipeline::new().run_dump(&dump)?;
            print_stats(&gantt.stats, gantt.dropped);
        }
        Command::Fetch {
            domain,
            session,
            access_token,
            refresh_token,
            config,
            save,
            view,
        } => {
            if domain.trim().is_empty() {
                bail!("--domain must not be empty");
            }
            let config = Config::load(config.as_deref())?;
            let store = Arc::new(FileSessionStore::new(FileSessionStore::default_dir()));
            let session_id = match session {
                Some(id) => id,
                None => {
                    let token = access_token.context("--access-token is required")?;
                    let session = Session::new(token, refresh_token, domain.clone());
                    let id = session.id.clone();
                    store.put(session).await;
                    id
                }
            };

            let dump = fetch(&config, store, &session_id, &domain).await?;
            if let Some(path) = save {
                std::fs::write(&path, serde_json::to_string_pretty(&dump)?)
                    .with_context(|| format!("writing {}", path.display()))?;
                log::info!("Saved raw payloads to {}", path.display());
            }

            let gantt = view.pipeline(&dump).run_dump(&dump)?;
            println!("{}", serde_json::to_string_pretty(&gantt.rows)?);
            eprintln!("session: {}", session_id);
        }
        Command::Sessions => {
            let store = FileSessionStore::new(FileSessionStore::default_dir());
            for id in store.list().await? {
                match store.get(&id).await {
                    Some(session) => println!("{}  {}  updated {}", id, session.domain, session.updated_at),
                    None => println!("{}  (unreadable)", id),
                }
            }
        }
    }

    Ok(())
}

/// Tasks, users and departments through the executor
async fn fetch(config: &Config, store: Arc<FileSessionStore>, session_id: &str, domain: &str) -> Result<RawDump> {
    if !config.has_credentials() {
        log::warn!("No OAuth client credentials configured; token refresh will fail");
    }

    let http = UpstreamClient::http_client(config)?;
    let client = UpstreamClient::new(http.clone(), config);
    let executor = RequestExecutor::new(store, Arc::new(OAuthRefresher::new(http, config)))
        .with_expired_error(config.expired_token_error.clone());
    let client = &client;

    let tasks = executor
        .execute(session_id, domain, |token| async move { client.list_tasks(domain, &token).await }, None)
        .await?;
    report_token(tasks.new_access_token.as_deref());

    let users = executor
        .execute(session_id, domain, |token| async move { client.list_users(domain, &token, 0).await }, None)
        .await?;
    report_token(users.new_access_token.as_deref());

    let departments = executor
        .execute(session_id, domain, |token| async move { client.list_departments(domain, &token).await }, None)
        .await?;
    report_token(departments.new_access_token.as_deref());

    if let Some(total) = tasks.data.total {
        if total as usize > tasks.data.tasks.len() {
            log::warn!("Upstream reports {} tasks, fetched {}", total, tasks.data.tasks.len());
        }
    }

    Ok(RawDump {
        tasks: tasks.data.tasks,
        projects: Vec::new(),
        users: users.data,
        departments: departments.data,
    })
}

fn report_token(token: Option<&str>) {
    if let Some(token) = token {
        let prefix: String = token.chars().take(6).collect();
        log::info!("Access token refreshed ({}...), stored in session", prefix);
    }
}

fn print_stats(stats: &SummaryStats, dropped: usize) {
    println!("Total:     {}", stats.total);
    println!("Overdue:   {}", stats.overdue);
    println!("Completed: {}", stats.completed);
    println!("Critical:  {}", stats.critical);
    if dropped > 0 {
        println!("Dropped:   {}", dropped);
    }
}
