use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod wiring;

#[derive(Parser)]
#[command(name = "elp")]
#[command(about = "PDT budget allocator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Day-trade budget commands
    Pdt {
        #[command(subcommand)]
        cmd: PdtCmd,
    },

    /// Run a JSON array of signals through an in-process router and print
    /// every decision as one JSON line
    Replay {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// JSON file holding an array of signals
        #[arg(long)]
        signals: String,

        /// Mirror signals and decisions to Postgres (database.url_env)
        #[arg(long, default_value_t = false)]
        journal: bool,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum PdtCmd {
    /// Print this week's budget.
    Status {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Seed the ledger from the day_trades table first
        #[arg(long, default_value_t = false)]
        from_db: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = elp_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Db { cmd } => {
            let pool = elp_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = elp_db::status(&pool).await?;
                    println!("db_ok={} has_day_trades_table={}", s.ok, s.has_day_trades_table);
                }
                DbCmd::Migrate => {
                    elp_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::Pdt { cmd } => match cmd {
            PdtCmd::Status {
                config_paths,
                from_db,
            } => commands::pdt::status(&config_paths, from_db).await?,
        },

        Commands::Replay {
            config_paths,
            signals,
            journal,
        } => commands::replay::run(&config_paths, &signals, journal).await?,
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
