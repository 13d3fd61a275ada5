use clap::{ArgAction, Parser, ValueEnum};
use demand_forecast::{Channel, ProductKey};
use replenishment::ingest;
use replenishment::{
    ForecastStore, InMemoryStore, JsonLinesStore, Planner, ProductStatus, RunConfig, RunRequest,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Marketplace {
    Wb,
    Ozon,
    Both,
}

impl Marketplace {
    fn channels(self) -> Vec<Channel> {
        match self {
            Marketplace::Wb => vec![Channel::Wildberries],
            Marketplace::Ozon => vec![Channel::Ozon],
            Marketplace::Both => Channel::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "replenish",
    about = "Forecast marketplace sales and plan warehouse shipments",
    version,
    after_help = "Data directory layout:\n  \
        sales.csv        date,channel,product,quantity\n  \
        stocks.csv       date,channel,warehouse,product,stock\n  \
        constraints.csv  product,withdrawn,defecture_until,box_size (optional)"
)]
struct Cli {
    /// Directory holding sales.csv, stocks.csv and constraints.csv
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    #[arg(long, value_enum, default_value = "both")]
    marketplace: Marketplace,

    /// Forecast horizon in months (defaults to the configured horizon)
    #[arg(long)]
    months: Option<usize>,

    /// Plan a single canonical product code
    #[arg(long)]
    product: Option<String>,

    /// TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON Lines file that receives every run record
    #[arg(long)]
    store: Option<PathBuf>,

    #[arg(long, action = ArgAction::SetTrue, help = "Emit logs as JSON")]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let result = if json {
        fmt().with_env_filter(filter).json().try_init()
    } else {
        fmt().with_env_filter(filter).try_init()
    };
    if let Err(err) = result {
        eprintln!("failed to install tracing subscriber: {}", err);
    }
}

fn run(cli: Cli) -> replenishment::Result<()> {
    let config = RunConfig::load(cli.config.as_deref())?;
    let horizon = cli.months.unwrap_or(config.evaluation.horizon);
    let product = cli.product.map(ProductKey::new).transpose()?;

    let inputs = ingest::load_dir(&cli.data_dir, config.default_box_size)?;
    let store: Arc<dyn ForecastStore> = match &cli.store {
        Some(path) => Arc::new(JsonLinesStore::new(path)),
        None => Arc::new(InMemoryStore::new()),
    };

    let planner = Planner::new(config, store)?;
    let request = RunRequest {
        channels: cli.marketplace.channels(),
        horizon,
        product,
    };
    let report = planner.run(&request, &inputs)?;

    println!("run {} ({} months)", report.run_id, report.horizon);
    for entry in &report.products {
        let status = match &entry.status {
            ProductStatus::Planned {
                model, total_units, ..
            } => format!("{:<22} {:>10} units", model.to_string(), total_units),
            ProductStatus::Skipped { reason } => format!("skipped: {}", reason),
            ProductStatus::Failed { error } => format!("failed: {}", error),
        };
        println!("{:<20} {:<5} {}", entry.product.as_str(), entry.channel.code(), status);
    }
    println!();
    for (channel, total) in report.totals_by_channel() {
        println!("{:<5} total {:>12} units", channel.code(), total);
    }
    println!(
        "planned {}, skipped {}, failed {}",
        report.planned(),
        report.skipped(),
        report.failed()
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
