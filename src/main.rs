use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tenantdb::cli::{self, Commands, Context};

#[derive(Parser)]
#[command(name = "tenantdb")]
#[command(about = "Provision and manage per-tenant MySQL and Postgres databases", long_about = None)]
struct Cli {
    /// Path to the service config file
    #[arg(long, global = true, default_value = "tenantdb.toml")]
    config: PathBuf,

    /// Act as this owner instead of as an operator
    #[arg(long, global = true)]
    as_owner: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tenantdb=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    let config = args.config;
    if let Commands::Init { force } = args.command {
        return cli::run_init(&config, force);
    }

    let ctx = Context::open(&config, args.as_owner)?;
    let result = match args.command {
        Commands::Init { force } => cli::run_init(&config, force),
        Commands::Create {
            flavor,
            owner,
            email,
            size_kb,
            json,
        } => cli::run_create(&ctx, flavor, owner, email, size_kb, json).await,
        Commands::List {
            owner,
            flavor,
            include_deleted,
            json,
        } => cli::run_list(&ctx, owner, flavor, include_deleted, json),
        Commands::Show { id, json } => cli::run_show(&ctx, &id, json),
        Commands::Password { id } => cli::run_password(&ctx, &id),
        Commands::Disable { id } => cli::run_disable(&ctx, &id).await,
        Commands::Enable { id } => cli::run_enable(&ctx, &id).await,
        Commands::Reset { id, yes } => cli::run_reset(&ctx, &id, yes).await,
        Commands::ResetPassword { id, password } => {
            cli::run_reset_password(&ctx, &id, password).await
        }
        Commands::Delete { id } => cli::run_delete(&ctx, &id).await,
        Commands::Admin { command } => cli::run_admin(&ctx, command).await,
        Commands::Sweep { json } => cli::run_sweep(&ctx, json).await,
        Commands::Serve => cli::run_serve(&ctx).await,
    };

    // The runtime drops unfinished deliveries once main returns.
    ctx.flush().await;
    result
}
