mod commands;
mod config;
mod server;
mod spoonacular;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{cmd_ingredient_list, cmd_recipe_list, cmd_recipe_show, cmd_user_list};
use crate::config::Config;
use crate::server::ServeOptions;
use potluck_core::db::Database;

#[derive(Parser)]
#[command(
    name = "potluck",
    version,
    about = "Share recipes, pool ingredients",
    long_about = "A small recipe-sharing server. Users sign up, post recipes as free-text \
                  ingredient lists, and potluck turns those lines into a shared ingredient \
                  catalogue."
)]
struct Cli {
    /// Path to the `SQLite` database (default: per-user data directory)
    #[arg(long, global = true, env = "POTLUCK_DB", value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (use 0.0.0.0 to expose to the network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Serve static files from this directory for unmatched paths
        #[arg(long, value_name = "DIR")]
        public_dir: Option<PathBuf>,
        /// Mark the session cookie `Secure` (set when behind HTTPS)
        #[arg(long)]
        secure_cookies: bool,
        /// Session lifetime in hours (1 to 87600)
        #[arg(
            long,
            default_value = "168",
            value_parser = clap::value_parser!(u32).range(1..=87_600)
        )]
        session_ttl_hours: u32,
        /// Spoonacular API key
        #[arg(long, env = "SPOONACULAR_API_KEY", hide_env_values = true)]
        spoonacular_key: Option<String>,
        /// Spoonacular base URL
        #[arg(long, default_value = spoonacular::DEFAULT_BASE_URL)]
        spoonacular_url: String,
        /// Timeout for Spoonacular requests, in seconds
        #[arg(long, default_value = "10")]
        spoonacular_timeout: u64,
    },
    /// Browse stored recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Browse the shared ingredient catalogue
    Ingredient {
        #[command(subcommand)]
        command: IngredientCommands,
    },
    /// Browse registered users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// List all recipes, newest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe with its ingredients
    Show {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum IngredientCommands {
    /// List ingredients with the number of recipes using each
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// List registered users
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "potluck=info,potluck_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.db)?;
    debug!(db = %config.db_path.display(), data_dir = %config.data_dir.display(), "opening database");
    let db = Database::open(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;

    match cli.command {
        Commands::Serve {
            port,
            bind,
            public_dir,
            secure_cookies,
            session_ttl_hours,
            spoonacular_key,
            spoonacular_url,
            spoonacular_timeout,
        } => {
            let options = ServeOptions {
                port,
                bind,
                public_dir,
                secure_cookies,
                session_ttl_hours,
                spoonacular_key,
                spoonacular_url,
                spoonacular_timeout_secs: spoonacular_timeout,
            };
            server::start_server(db, options).await
        }
        Commands::Recipe { command } => match command {
            RecipeCommands::List { json } => cmd_recipe_list(&db, json),
            RecipeCommands::Show { id, json } => cmd_recipe_show(&db, id, json),
        },
        Commands::Ingredient { command } => match command {
            IngredientCommands::List { json } => cmd_ingredient_list(&db, json),
        },
        Commands::User { command } => match command {
            UserCommands::List { json } => cmd_user_list(&db, json),
        },
    }
}
