use crate::config::Config;
use crate::{CliError, configure, open_store};
use bo_core::types::{Booking, BookingRequest, InventoryId};
use bo_core::{BookingError, RequestContext};
use bo_db::DbStore;
use bo_db::util::store_err;
use chrono::Utc;
use clap::Args;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Args)]
pub struct LoadArgs {
    #[arg(long)]
    pub inventory: InventoryId,
    #[arg(long, default_value_t = 500)]
    pub users: usize,
    #[arg(long, default_value_t = 1)]
    pub tickets: u32,
    /// Print a colored summary instead of JSON.
    #[arg(long)]
    pub summary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub inventory_id: InventoryId,
    pub users: usize,
    pub succeeded: usize,
    pub failed: BTreeMap<&'static str, usize>,
    pub tickets_sold: u64,
    pub available: u32,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Tally {
    succeeded: usize,
    failed: BTreeMap<&'static str, usize>,
    tickets_sold: u64,
}

impl Tally {
    fn record(&mut self, outcome: &Result<Booking, BookingError>) {
        match outcome {
            Ok(booking) => {
                self.succeeded += 1;
                self.tickets_sold += u64::from(booking.ticket_count);
            }
            Err(err) => *self.failed.entry(err.code()).or_insert(0) += 1,
        }
    }
}

/// One blocking worker and one connection per simulated user. Connections are
/// opened up front so the workers contend on the booking path only.
pub async fn run(args: &LoadArgs, config: &Config) -> Result<LoadReport, CliError> {
    let office = configure(open_store(config)?, config);
    office.catalog().get_inventory(&args.inventory)?;

    let started = Instant::now();
    let mut workers = Vec::with_capacity(args.users);
    for n in 0..args.users {
        let conn = bo_db::schema::open(&config.database_path, config.busy_timeout_ms)
            .map_err(store_err)?;
        let store = DbStore::new(conn);
        let config = config.clone();
        let request = BookingRequest {
            inventory_id: args.inventory.clone(),
            user_id: format!("load-user-{n}"),
            ticket_count: args.tickets,
        };
        workers.push(tokio::task::spawn_blocking(move || {
            let office = configure(store, &config);
            let mut ctx = RequestContext::new(Some(format!("load-{n}")));
            if let Some(timeout) = config.deadline() {
                ctx = ctx.with_timeout(Utc::now(), timeout);
            }
            office.reservations().book(&ctx, request)
        }));
    }

    let mut tally = Tally::default();
    for worker in workers {
        tally.record(&worker.await?);
    }
    let elapsed = started.elapsed();

    let inventory = office.catalog().get_inventory(&args.inventory)?;
    info!(
        inventory_id = %inventory.id,
        succeeded = tally.succeeded,
        available = inventory.available,
        "load run finished"
    );
    Ok(LoadReport {
        inventory_id: inventory.id,
        users: args.users,
        succeeded: tally.succeeded,
        failed: tally.failed,
        tickets_sold: tally.tickets_sold,
        available: inventory.available,
        elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
    })
}

pub fn render_summary(report: &LoadReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} ({} users, {} ms)",
        "load".if_supports_color(Stream::Stdout, |text| text.bold()),
        report.inventory_id,
        report.users,
        report.elapsed_ms
    );
    let _ = writeln!(
        out,
        "  {} {}",
        "succeeded".if_supports_color(Stream::Stdout, |text| text.green()),
        report.succeeded
    );
    for (code, count) in &report.failed {
        let _ = writeln!(
            out,
            "  {} {count}",
            code.if_supports_color(Stream::Stdout, |text| text.red())
        );
    }
    let _ = write!(
        out,
        "  tickets sold {}, available {}",
        report.tickets_sold, report.available
    );
    out
}
