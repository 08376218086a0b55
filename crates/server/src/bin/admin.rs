use anyhow::Context;
use clap::{Parser, Subcommand};
use db::{
    DBService,
    models::user::{CreateUser, User},
    seed,
};
use server::config::AppConfig;
use tracing_subscriber::{EnvFilter, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tasktrack-admin: maintenance commands for the tasktrack database",
    long_about = None
)]
struct Cli {
    /// Database to operate on. Defaults to DATABASE_URL or the local asset directory.
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Fill the database with demo data",
        after_help = "EXAMPLES:\n    # Add demo data, keeping existing rows\n    tasktrack-admin seed\n\n    # Wipe reference data, projects and tasks first\n    tasktrack-admin seed --clear"
    )]
    Seed {
        /// Delete tasks, projects, tags, statuses and priorities before seeding.
        #[arg(long)]
        clear: bool,
    },

    #[command(
        about = "Create a user and print its API token",
        long_about = "Create a user and print its API token. An existing user gets a fresh token."
    )]
    CreateUser {
        #[arg(long)]
        username: String,

        #[arg(long, default_value = "")]
        email: String,

        #[arg(long)]
        superuser: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn,db=info"))
        .context("Failed to build log filter")?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(env_filter),
        )
        .init();

    let cli = Cli::parse();
    let database_url = match cli.database_url {
        Some(url) => url,
        None => AppConfig::from_env()?.database_url,
    };
    let db = DBService::new(&database_url)
        .await
        .with_context(|| format!("Failed to open database {database_url}"))?;

    match cli.command {
        Commands::Seed { clear } => {
            let summary = seed::fill_test_data(&db.pool, clear).await?;
            println!("Test data ready:");
            println!("  priorities: {}", summary.priorities);
            println!("  statuses:   {}", summary.statuses);
            println!("  tags:       {}", summary.tags);
            println!("  projects:   {}", summary.projects);
            println!("  tasks:      {}", summary.tasks);
        }
        Commands::CreateUser {
            username,
            email,
            superuser,
        } => {
            let token = match User::rotate_token(&db.pool, &username).await? {
                Some(token) => {
                    tracing::info!("User '{username}' exists; issued a new token");
                    token
                }
                None => {
                    let data = CreateUser {
                        username: username.clone(),
                        email,
                        first_name: String::new(),
                        last_name: String::new(),
                        is_superuser: superuser,
                    };
                    User::create(&db.pool, &data).await?.1
                }
            };
            println!("{token}");
        }
    }

    Ok(())
}
