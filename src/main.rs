use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod app;
mod auth;
mod config;
mod error;
mod extract;
mod images;
mod ingredients;
mod pagination;
mod recipes;
mod state;
mod storage;
mod store;
mod tags;
mod users;

use crate::config::AppConfig;
use crate::store::{PgStore, UserRepo};
use crate::users::repo_types::Role;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Load the ingredient catalog from a JSON or headered CSV file
    LoadIngredients {
        #[arg(long, default_value = "data/ingredients.json")]
        path: PathBuf,
    },
    /// Change the role of an existing account
    GrantRole {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "admin")]
        role: Role,
    },
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "foodgram=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

async fn connect_store() -> anyhow::Result<PgStore> {
    PgStore::open(&AppConfig::database_url_from_env()?, 2).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let config = AppConfig::from_env()?;
            let addr = config.bind_addr()?;
            let app_state = state::AppState::init(config).await?;
            app::serve(app::build_app(app_state), addr).await?;
        }
        Command::LoadIngredients { path } => {
            let store = connect_store().await?;
            let added = ingredients::loader::load_from_path(&store, &path).await?;
            tracing::info!(added, path = %path.display(), "ingredients loaded");
        }
        Command::GrantRole { email, role } => {
            let store = connect_store().await?;
            let email = email.trim().to_lowercase();
            if !store.set_role(&email, role).await? {
                anyhow::bail!("no user with email {email}");
            }
            tracing::info!(%email, ?role, "role granted");
        }
    }

    Ok(())
}
