use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use stagehand::auth::AuthService;
use stagehand::config::Config;
use stagehand::rooms::LiveKitClient;
use stagehand::server::{AppState, create_router};
use stagehand::store::{SqliteStore, Store};
use stagehand::sweeper;
use stagehand::types::Role;

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(
    about = "Identity, session and room membership server for video meetings",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file with fresh secrets and create the database
    Init {
        /// Path of the config file to create
        #[arg(long, default_value = "stagehand.toml")]
        config: PathBuf,

        /// Data directory for the database
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Start the server
    Serve {
        #[arg(long, default_value = "stagehand.toml")]
        config: PathBuf,
    },

    /// Administrative commands
    Admin {
        #[arg(long, default_value = "stagehand.toml", global = true)]
        config: PathBuf,

        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Add a role to an existing user
    GrantRole {
        #[arg(long)]
        email: String,

        /// One of: guest, user, moderator, admin, superadmin
        #[arg(long)]
        role: String,
    },

    /// List registered users
    ListUsers,
}

fn open_store(config: &Config) -> anyhow::Result<SqliteStore> {
    fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "failed to create data directory {}",
            config.server.data_dir.display()
        )
    })?;
    let store = SqliteStore::new(config.server.db_path())?;
    store.initialize()?;
    Ok(store)
}

fn run_init(path: &Path, data_dir: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!(
            "Config file {} already exists. Pass --force to overwrite it.",
            path.display()
        );
    }

    let mut config = Config::generate();
    if let Some(dir) = data_dir {
        config.server.data_dir = dir;
    }

    fs::write(path, config.to_toml()?)?;
    #[cfg(unix)]
    set_restrictive_permissions(path);

    open_store(&config)?;

    println!();
    println!("========================================");
    println!("Wrote config to {}", path.display());
    println!("Database at {}", config.server.db_path().display());
    println!();
    println!("Set media.api_key / media.api_secret to match your media server,");
    println!("then start with: stagehand serve --config {}", path.display());
    println!("========================================");
    println!();

    Ok(())
}

fn run_admin(config_path: &Path, command: AdminCommands) -> anyhow::Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let store: Arc<dyn Store> = Arc::new(open_store(&config)?);
    let auth = AuthService::from_config(&config, store)?;

    match command {
        AdminCommands::GrantRole { email, role } => {
            let Some(role) = Role::parse(&role) else {
                bail!("Unknown role '{role}'");
            };
            let user = auth.grant_role(&email, role)?;
            let roles: Vec<_> = user.roles.iter().map(|r| r.as_str()).collect();
            println!("{} now has roles: {}", user.email, roles.join(", "));
        }
        AdminCommands::ListUsers => {
            for user in auth.list_users()? {
                let roles: Vec<_> = user.roles.iter().map(|r| r.as_str()).collect();
                let status = if user.is_active { "active" } else { "disabled" };
                println!("{}\t{}\t{}\t{}", user.id, user.email, roles.join(","), status);
            }
        }
    }

    Ok(())
}

async fn run_serve(config_path: &Path) -> anyhow::Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let store: Arc<dyn Store> = Arc::new(open_store(&config)?);
    let media = Arc::new(LiveKitClient::new(&config.media)?);
    let addr = config.server.socket_addr()?;
    let interval = config.sweeper.interval();

    let state = Arc::new(AppState::new(config, store, media)?);
    sweeper::spawn(state.rooms.clone(), state.tokens.clone(), interval);

    let app = create_router(state);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("stagehand=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            config,
            data_dir,
            force,
        } => run_init(&config, data_dir, force)?,
        Commands::Serve { config } => run_serve(&config).await?,
        Commands::Admin { config, command } => run_admin(&config, command)?,
    }

    Ok(())
}
