// crates/cli/src/main.rs
//! Terminal front end for the migration client: sign in, connect the
//! provider accounts, start migrations and watch their progress live.

mod app;
mod watch;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mailshift_types::{MigrationCategory, Provider};

use crate::app::App;

#[derive(Parser)]
#[command(name = "mailshift", version, about = "Move mail, contacts, calendar and drive data between providers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account and sign in.
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign in with an existing account.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign out and erase the persisted session.
    Logout,
    /// Show the signed-in identity and authorization status.
    Whoami,
    /// Open a provider's consent page to authorize access.
    Connect {
        provider: Provider,
        /// Print the consent URL instead of opening a browser.
        #[arg(long)]
        no_browser: bool,
    },
    /// Revoke a provider authorization.
    Disconnect { provider: Provider },
    /// Re-fetch the provider authorization slots.
    Refresh,
    /// List all migration jobs.
    Jobs,
    /// Show one job.
    Job { job_id: String },
    /// Start a migration.
    Start {
        category: MigrationCategory,
        /// Stay attached and render live progress.
        #[arg(long)]
        watch: bool,
    },
    Pause { job_id: String },
    Resume { job_id: String },
    Cancel { job_id: String },
    /// Attach to the realtime stream and render the current job.
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn,mailshift=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let app = App::new().context("failed to initialize")?;

    match cli.command {
        Command::Signup {
            name,
            email,
            password,
        } => {
            app.store.sign_up(&name, &email, &password).await?;
            println!("Account created. Signed in as {email}");
        }
        Command::Login { email, password } => {
            app.store.sign_in(&email, &password).await?;
            println!("Signed in as {email}");
        }
        Command::Logout => {
            let _ = app.restore().await;
            app.store.sign_out();
            println!("Signed out");
        }
        Command::Whoami => {
            let identity = app.require_session().await?;
            let tokens = app.store.refresh_authorizations().await.unwrap_or_default();
            let online = app.store.backend_online().await;
            println!("{} <{}> (user id {})", identity.name, identity.email, identity.user_id);
            println!(
                "  outlook: {}",
                if tokens.outlook.is_some() { "connected" } else { "not connected" }
            );
            println!(
                "  gmail:   {}",
                if tokens.gmail.is_some() { "connected" } else { "not connected" }
            );
            println!("  backend: {}", if online { "online" } else { "offline" });
        }
        Command::Connect {
            provider,
            no_browser,
        } => {
            app.require_session().await?;
            let url = app.store.authorize_url(provider)?;
            if no_browser {
                println!("Open this URL to authorize {provider}:\n  {url}");
            } else {
                println!("Opening {provider} consent page...");
                if open::that(&url).is_err() {
                    println!("Could not open a browser. Authorize {provider} here:\n  {url}");
                }
            }
            println!("After completing consent, run `mailshift refresh`.");
        }
        Command::Disconnect { provider } => {
            app.require_session().await?;
            app.store.revoke_authorization(provider).await?;
            println!("{provider} disconnected");
        }
        Command::Refresh => {
            app.require_session().await?;
            let tokens = app.store.refresh_authorizations().await?;
            println!(
                "outlook: {}  gmail: {}",
                if tokens.outlook.is_some() { "connected" } else { "not connected" },
                if tokens.gmail.is_some() { "connected" } else { "not connected" },
            );
        }
        Command::Jobs => {
            app.require_session().await?;
            let jobs = app.coordinator.list_jobs().await;
            if jobs.is_empty() {
                println!("No migration jobs yet.");
            } else {
                for job in jobs {
                    println!("{}", app::format_job_line(&job));
                }
            }
        }
        Command::Job { job_id } => {
            let identity = app.require_session().await?;
            let token = app.store.token().unwrap_or_default();
            let update = app
                .backend
                .status
                .job(&token, &identity.user_id, &job_id)
                .await
                .with_context(|| format!("failed to fetch job {job_id}"))?;
            println!("{}", app::format_job_line(&update.into_job()));
        }
        Command::Start { category, watch } => {
            app.require_session().await?;
            // Populate the authorization slots before the start guard.
            let _ = app.store.refresh_authorizations().await;
            app.coordinator.connect()?;
            let job_id = app.coordinator.start_migration(category).await?;
            println!("Migration started: {job_id}");
            if watch {
                app.spawn_notification_printer();
                watch::run(app.coordinator.clone()).await?;
            }
        }
        Command::Pause { job_id } => {
            app.require_session().await?;
            app.coordinator.pause(&job_id).await?;
            println!("Pause requested for {job_id}");
        }
        Command::Resume { job_id } => {
            app.require_session().await?;
            app.coordinator.resume(&job_id).await?;
            println!("Resume requested for {job_id}");
        }
        Command::Cancel { job_id } => {
            app.require_session().await?;
            app.coordinator.cancel(&job_id).await?;
            println!("Cancelled {job_id}");
        }
        Command::Watch => {
            app.require_session().await?;
            app.coordinator.connect()?;
            let _ = app.coordinator.list_jobs().await;
            app.spawn_notification_printer();
            watch::run(app.coordinator.clone()).await?;
        }
    }

    // Close the realtime link if a command opened it.
    app.coordinator.disconnect();
    Ok(())
}
