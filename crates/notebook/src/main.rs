//! notebook CLI entry point.
//!
//! Drives a notebook editing session against a running lab backend: show a
//! notebook, run cells, add cells, rename, delete, and manage the kernel's
//! package set.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use lab_api::{ApiClient, NotebookApi, ResourceId};
use notebook::kernel::{KernelMonitor, PackageInstaller};
use notebook::{NotebookSession, SessionEvent};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "notebook")]
#[command(about = "Edit and run lab notebooks from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend base URL, e.g. http://localhost:8000/api
    #[arg(
        long,
        global = true,
        env = "LAB_API_URL",
        default_value = "http://localhost:8000/api"
    )]
    base_url: String,

    /// Bearer token for the backend
    #[arg(long, global = true, env = "LAB_API_TOKEN")]
    token: Option<String>,

    /// Log level
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show a notebook: cells in order plus kernel status
    Show { notebook_id: String },

    /// Run one cell and print its output
    Run {
        notebook_id: String,
        cell_id: String,
    },

    /// Append an empty cell to a notebook
    AddCell { notebook_id: String },

    /// Rename a notebook
    Rename { notebook_id: String, name: String },

    /// Delete a notebook
    Delete { notebook_id: String },

    /// Install a package into the kernel
    Install { package: String },

    /// Print the kernel's status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let mut client = ApiClient::new(&cli.base_url)?;
    if let Some(token) = &cli.token {
        client = client.with_token(token.clone());
    }
    let api: Arc<dyn NotebookApi> = Arc::new(client);

    match cli.command {
        Commands::Show { notebook_id } => {
            let (session, _events) =
                NotebookSession::open(api, ResourceId::from(notebook_id)).await?;
            print_notebook(&session);
        }

        Commands::Run {
            notebook_id,
            cell_id,
        } => {
            let (session, mut events) =
                NotebookSession::open(api, ResourceId::from(notebook_id)).await?;
            let cell_id = ResourceId::from(cell_id);
            if !session.run_cell(&cell_id).await {
                anyhow::bail!("cell {} not found or a run is already in flight", cell_id);
            }
            drain_errors(&mut events);
            let cells = session.cells();
            match cells.iter().find(|c| c.id == cell_id) {
                Some(cell) => print_cell(cell),
                None => println!("cell {} no longer exists", cell_id),
            }
        }

        Commands::AddCell { notebook_id } => {
            let (session, mut events) =
                NotebookSession::open(api, ResourceId::from(notebook_id)).await?;
            match session.add_cell().await {
                Some(id) => println!("created cell {}", id),
                None => drain_errors(&mut events),
            }
        }

        Commands::Rename { notebook_id, name } => {
            let (session, mut events) =
                NotebookSession::open(api, ResourceId::from(notebook_id)).await?;
            session.rename(&name).await;
            drain_errors(&mut events);
            println!("notebook {} is now \"{}\"", session.notebook_id(), session.notebook().name);
        }

        Commands::Delete { notebook_id } => {
            let (session, mut events) =
                NotebookSession::open(api, ResourceId::from(notebook_id)).await?;
            if session.delete().await {
                println!("deleted notebook {}", session.notebook_id());
            } else {
                drain_errors(&mut events);
            }
        }

        Commands::Install { package } => {
            let (events_tx, mut events) = mpsc::unbounded_channel();
            let monitor = Arc::new(KernelMonitor::new(Arc::clone(&api)));
            let installer = PackageInstaller::new(api, Arc::clone(&monitor), events_tx);
            if !installer.install(&package).await {
                anyhow::bail!("package name must not be empty");
            }
            drain_errors(&mut events);
            if let Some(output) = installer.last_output() {
                println!("{}", output.display_stream());
            }
            println!("kernel: {}", monitor.current().status);
        }

        Commands::Status => {
            let monitor = KernelMonitor::new(api);
            let status = monitor.refresh().await;
            println!("kernel: {}", status.status);
            for (key, value) in &status.extra {
                println!("  {}: {}", key, value);
            }
        }
    }

    Ok(())
}

fn print_notebook(session: &NotebookSession) {
    let notebook = session.notebook();
    println!("{} (kernel: {})", notebook.name, session.kernel_status().status);
    for (idx, cell) in session.cells().iter().enumerate() {
        println!("\n── cell {} (id {}) ──", idx + 1, cell.id);
        print_cell(cell);
    }
}

fn print_cell(cell: &lab_api::Cell) {
    if cell.code.is_empty() {
        println!("(empty)");
    } else {
        println!("{}", cell.code);
    }
    if let Some(at) = cell.last_executed_at {
        let duration = cell
            .last_duration_ms
            .map(|ms| format!(" • {} ms", ms))
            .unwrap_or_default();
        let exit = cell
            .last_exit_code
            .map(|code| format!(" • exit {}", code))
            .unwrap_or_default();
        println!("last run: {}{}{}", at.to_rfc3339(), duration, exit);
    }
    if let Some(stdout) = cell.last_stdout.as_deref().filter(|s| !s.is_empty()) {
        println!("{}", stdout);
    }
    if let Some(stderr) = cell.last_stderr.as_deref().filter(|s| !s.is_empty()) {
        eprintln!("{}", stderr);
    }
}

fn drain_errors(events: &mut mpsc::UnboundedReceiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        let SessionEvent::Error(message) = event;
        eprintln!("error: {}", message);
    }
}
