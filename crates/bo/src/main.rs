mod config;
mod load;

use crate::config::{Config, ConfigError, DEFAULT_LOG_LEVEL, Overrides};
use bo_core::types::{
    BookingId, BookingRequest, BookingWindow, CancelRequest, CreateInventoryInput,
    InventoryDetails, InventoryFilter, InventoryId,
};
use bo_core::{BookingError, BoxOffice, BoxOfficeError, CatalogError, RequestContext, StoreError};
use bo_db::DbStore;
use bo_db::util::store_err;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bo", version, about = "Ticket box office backed by SQLite")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// TOML config file.
    #[arg(long, global = true, env = "BOXOFFICE_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long = "db", global = true, env = "BOXOFFICE_DB_PATH")]
    database_path: Option<PathBuf>,
    #[arg(long, global = true, env = "BOXOFFICE_BUSY_TIMEOUT_MS")]
    busy_timeout_ms: Option<u32>,
    #[arg(long, global = true, env = "BOXOFFICE_MAX_ATTEMPTS")]
    max_attempts: Option<u32>,
    #[arg(long, global = true, env = "BOXOFFICE_BASE_DELAY_MS")]
    base_delay_ms: Option<u64>,
    /// Overall deadline for each booking or cancellation call.
    #[arg(long, global = true, env = "BOXOFFICE_DEADLINE_MS")]
    deadline_ms: Option<u64>,
    #[arg(long, global = true, env = "BOXOFFICE_LOG_LEVEL")]
    log_level: Option<String>,
}

impl GlobalArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            database_path: self.database_path.clone(),
            busy_timeout_ms: self.busy_timeout_ms,
            max_attempts: self.max_attempts,
            base_delay_ms: self.base_delay_ms,
            deadline_ms: self.deadline_ms,
            log_level: self.log_level.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Create the database and apply migrations.
    Init,
    #[command(subcommand)]
    Inventory(InventoryCommand),
    Book {
        #[arg(long)]
        inventory: InventoryId,
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 1)]
        tickets: u32,
    },
    Cancel {
        #[arg(long)]
        booking: BookingId,
        #[arg(long)]
        user: String,
    },
    #[command(subcommand)]
    Bookings(BookingsCommand),
    /// Capacity, availability and confirmed tickets for one inventory.
    Ledger { inventory: InventoryId },
    /// Fire concurrent single-connection bookings at one inventory.
    Load(load::LoadArgs),
}

#[derive(Subcommand)]
enum InventoryCommand {
    Create(CreateArgs),
    Get { id: InventoryId },
    List(ListArgs),
    Update(UpdateArgs),
}

#[derive(Args)]
struct CreateArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    artist: String,
    #[arg(long)]
    venue: String,
    #[arg(long)]
    event_date: DateTime<Utc>,
    #[arg(long, default_value_t = 0)]
    price_cents: u64,
    #[arg(long)]
    capacity: u32,
    #[arg(long)]
    window_start: DateTime<Utc>,
    #[arg(long)]
    window_end: DateTime<Utc>,
}

#[derive(Args)]
struct ListArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    artist: Option<String>,
    #[arg(long)]
    venue: Option<String>,
    #[arg(long)]
    from: Option<DateTime<Utc>>,
    #[arg(long)]
    to: Option<DateTime<Utc>>,
    #[arg(long)]
    available_only: bool,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 20)]
    page_size: u32,
}

#[derive(Args)]
struct UpdateArgs {
    id: InventoryId,
    #[arg(long)]
    expected_version: u64,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    artist: Option<String>,
    #[arg(long)]
    venue: Option<String>,
    #[arg(long)]
    event_date: Option<DateTime<Utc>>,
    #[arg(long)]
    price_cents: Option<u64>,
    #[arg(long, requires = "window_end")]
    window_start: Option<DateTime<Utc>>,
    #[arg(long, requires = "window_start")]
    window_end: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
enum BookingsCommand {
    Get {
        id: BookingId,
    },
    List {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        page_size: u32,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    BoxOffice(#[from] BoxOfficeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<BookingError> for CliError {
    fn from(value: BookingError) -> Self {
        Self::BoxOffice(value.into())
    }
}

impl From<CatalogError> for CliError {
    fn from(value: CatalogError) -> Self {
        Self::BoxOffice(value.into())
    }
}

impl From<StoreError> for CliError {
    fn from(value: StoreError) -> Self {
        Self::BoxOffice(value.into())
    }
}

impl CliError {
    fn code(&self) -> &'static str {
        match self {
            Self::BoxOffice(err) => err.code(),
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "serialization_error",
            Self::Join(_) => "internal_error",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match Config::load(cli.global.config.as_deref(), &cli.global.overrides()) {
        Ok(config) => config,
        Err(err) => {
            report_error(&err.into());
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log_level);

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins when set; otherwise the configured level applies.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(command: Command, config: &Config) -> Result<(), CliError> {
    match command {
        Command::Init => {
            open_store(config)?;
            print_json(&serde_json::json!({ "database": config.database_path }))
        }
        Command::Inventory(command) => run_inventory(command, config),
        Command::Book {
            inventory,
            user,
            tickets,
        } => {
            let office = office(config)?;
            let booking = office.reservations().book(
                &request_context(config),
                BookingRequest {
                    inventory_id: inventory,
                    user_id: user,
                    ticket_count: tickets,
                },
            )?;
            print_json(&booking)
        }
        Command::Cancel { booking, user } => {
            let office = office(config)?;
            let ack = office.cancellations().cancel(
                &request_context(config),
                CancelRequest {
                    booking_id: booking,
                    user_id: user,
                },
            )?;
            print_json(&ack)
        }
        Command::Bookings(BookingsCommand::Get { id }) => {
            print_json(&office(config)?.catalog().get_booking(&id)?)
        }
        Command::Bookings(BookingsCommand::List {
            user,
            page,
            page_size,
        }) => print_json(
            &office(config)?
                .catalog()
                .list_user_bookings(&user, page, page_size)?,
        ),
        Command::Ledger { inventory } => {
            print_json(&office(config)?.catalog().ledger(&inventory)?)
        }
        Command::Load(args) => {
            let report = load::run(&args, config).await?;
            if args.summary {
                println!("{}", load::render_summary(&report));
                Ok(())
            } else {
                print_json(&report)
            }
        }
    }
}

fn run_inventory(command: InventoryCommand, config: &Config) -> Result<(), CliError> {
    let office = office(config)?;
    let catalog = office.catalog();
    match command {
        InventoryCommand::Create(args) => print_json(&catalog.create_inventory(
            CreateInventoryInput {
                name: args.name,
                artist: args.artist,
                venue: args.venue,
                event_date: args.event_date,
                price_cents: args.price_cents,
                total_capacity: args.capacity,
                booking_window: BookingWindow::new(args.window_start, args.window_end),
            },
        )?),
        InventoryCommand::Get { id } => print_json(&catalog.get_inventory(&id)?),
        InventoryCommand::List(args) => {
            let filter = InventoryFilter {
                name: args.name,
                artist: args.artist,
                venue: args.venue,
                event_from: args.from,
                event_to: args.to,
                available_only: args.available_only,
            };
            print_json(&catalog.list_inventories(&filter, args.page, args.page_size)?)
        }
        InventoryCommand::Update(args) => {
            let booking_window = match (args.window_start, args.window_end) {
                (Some(start), Some(end)) => Some(BookingWindow::new(start, end)),
                _ => None,
            };
            let details = InventoryDetails {
                name: args.name,
                artist: args.artist,
                venue: args.venue,
                event_date: args.event_date,
                price_cents: args.price_cents,
                booking_window,
            };
            print_json(&catalog.update_inventory_details(
                &args.id,
                args.expected_version,
                details,
            )?)
        }
    }
}

pub(crate) fn open_store(config: &Config) -> Result<DbStore, CliError> {
    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = bo_db::schema::open_and_migrate(&config.database_path, config.busy_timeout_ms)
        .map_err(store_err)?;
    Ok(DbStore::new(conn))
}

pub(crate) fn configure(store: DbStore, config: &Config) -> BoxOffice<DbStore> {
    BoxOffice::new(store)
        .with_retry_policy(config.retry_policy())
        .with_lock_timeout(config.lock_timeout())
}

fn office(config: &Config) -> Result<BoxOffice<DbStore>, CliError> {
    Ok(configure(open_store(config)?, config))
}

fn request_context(config: &Config) -> RequestContext {
    let ctx = RequestContext::default();
    match config.deadline() {
        Some(timeout) => ctx.with_timeout(Utc::now(), timeout),
        None => ctx,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_error(err: &CliError) {
    let body = serde_json::json!({
        "error": {
            "code": err.code(),
            "message": err.to_string(),
        }
    });
    eprintln!("{body}");
}
