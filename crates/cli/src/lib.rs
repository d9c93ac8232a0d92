pub mod commands;
pub mod logging;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use salescope_core::config::{AppConfig, ConfigOverrides};
use salescope_core::{DomainError, FilterSpec, RevenueType};

use crate::commands::CommandOptions;

#[derive(Debug, Parser)]
#[command(
    name = "salescope",
    about = "Salescope sales analytics CLI",
    long_about = "Load the sales ledgers, run one analytics report, and print the result as JSON.",
    after_help = "Examples:\n  salescope seed\n  salescope overview --year 2026 --region EMEA\n  salescope forecast --by quarter --revenue-type license\n  salescope movement --lookback 3"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    #[arg(long, global = true, help = "Explicit salescope.toml path")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Read ledgers from a JSON export instead of the database")]
    dataset: Option<PathBuf>,
    #[arg(long, global = true, help = "Override database.url")]
    database_url: Option<String>,
    #[arg(long, global = true, help = "Override analytics.operating_year")]
    operating_year: Option<i32>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Load the demo ledgers, or import a JSON export with --from")]
    Seed {
        #[arg(long, help = "JSON export to import in place of the demo dataset")]
        from: Option<PathBuf>,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Headline KPIs: closed, pipeline, forecast, conversion, sales cycle")]
    Overview(FilterArgs),
    #[command(about = "Open deals by stage followed by closed won and lost")]
    Funnel(FilterArgs),
    #[command(about = "Forecast trend or sub-category tables")]
    Forecast {
        #[arg(long, value_enum, default_value_t = ForecastBy::Quarter)]
        by: ForecastBy,
        #[command(flatten)]
        filters: FilterArgs,
    },
    #[command(about = "Sortable, paginated list of open (or --closed) deals")]
    Deals {
        #[arg(long, help = "List won deals instead of open pipeline")]
        closed: bool,
        #[arg(long, default_value = "value", help = "value|probability|close-date|name")]
        sort: String,
        #[arg(long, conflicts_with = "desc", help = "Sort ascending")]
        asc: bool,
        #[arg(long, help = "Sort descending (default)")]
        desc: bool,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        limit: Option<usize>,
        #[command(flatten)]
        filters: FilterArgs,
    },
    #[command(about = "A single deal by id")]
    Deal { id: String },
    #[command(about = "Pipeline movement waterfall between two snapshot months")]
    Movement {
        #[arg(long, help = "Months between target and comparison snapshot")]
        lookback: Option<u32>,
        #[command(flatten)]
        filters: FilterArgs,
    },
    #[command(about = "Sales-rep performance rolled up through the management tree")]
    Rollup {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, conflicts_with = "rep", help = "Monthly attainment grid only")]
        heatmap: bool,
        #[arg(long, help = "A single salesperson id")]
        rep: Option<String>,
        #[command(flatten)]
        filters: FilterArgs,
    },
    #[command(about = "Monte Carlo spread of the forecast")]
    Simulate {
        #[arg(long)]
        iterations: Option<u32>,
        #[arg(long)]
        seed: Option<u64>,
        #[command(flatten)]
        filters: FilterArgs,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ForecastBy {
    Quarter,
    Region,
    Month,
    SubCategory,
    SubCategoryPipeline,
}

/// Filter flags shared by every report. Repeat a flag or separate values
/// with commas to select several.
#[derive(Clone, Debug, Default, Args)]
pub struct FilterArgs {
    #[arg(long = "year", value_delimiter = ',')]
    pub years: Vec<i32>,
    #[arg(long = "quarter", value_delimiter = ',')]
    pub quarters: Vec<u32>,
    #[arg(long = "month", value_delimiter = ',')]
    pub months: Vec<u32>,
    #[arg(long = "region", value_delimiter = ',')]
    pub regions: Vec<String>,
    #[arg(long = "vertical", value_delimiter = ',')]
    pub verticals: Vec<String>,
    #[arg(long = "segment", value_delimiter = ',')]
    pub segments: Vec<String>,
    #[arg(long = "logo-type", value_delimiter = ',')]
    pub logo_types: Vec<String>,
    #[arg(long = "category", value_delimiter = ',')]
    pub categories: Vec<String>,
    #[arg(long = "sub-category", value_delimiter = ',')]
    pub sub_categories: Vec<String>,
    #[arg(long)]
    pub sold_by: Option<String>,
    #[arg(long, help = "license|implementation|all")]
    pub revenue_type: Option<String>,
}

impl FilterArgs {
    pub fn to_filter(&self) -> Result<FilterSpec, DomainError> {
        let revenue_type =
            self.revenue_type.as_deref().map(str::parse::<RevenueType>).transpose()?;

        Ok(FilterSpec {
            years: self.years.clone(),
            quarters: self.quarters.clone(),
            months: self.months.clone(),
            regions: self.regions.clone(),
            verticals: self.verticals.clone(),
            segments: self.segments.clone(),
            logo_types: self.logo_types.clone(),
            product_categories: self.categories.clone(),
            product_sub_categories: self.sub_categories.clone(),
            sold_by: self.sold_by.clone(),
            revenue_type,
        })
    }
}

pub fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let options = CommandOptions {
        config_path: cli.global.config,
        dataset_path: cli.global.dataset,
        overrides: ConfigOverrides {
            database_url: cli.global.database_url,
            operating_year: cli.global.operating_year,
            ..ConfigOverrides::default()
        },
    };

    // Logging falls back to defaults; config errors are reported by the command itself.
    let logging_config = AppConfig::load(options.load_options()).unwrap_or_default();
    logging::init_logging(&logging_config);

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed { from } => commands::seed::run(&options, from.as_deref()),
        Command::Config => commands::config::run(&options),
        Command::Overview(filters) => commands::reports::overview(&options, &filters),
        Command::Funnel(filters) => commands::reports::funnel(&options, &filters),
        Command::Forecast { by, filters } => commands::reports::forecast(&options, by, &filters),
        Command::Deals { closed, sort, asc, desc: _, offset, limit, filters } => {
            let request = commands::reports::DealsRequest { closed, sort, asc, offset, limit };
            commands::reports::deals(&options, &request, &filters)
        }
        Command::Deal { id } => commands::reports::deal(&options, &id),
        Command::Movement { lookback, filters } => {
            commands::reports::movement(&options, lookback, &filters)
        }
        Command::Rollup { year, heatmap, rep, filters } => {
            let request = commands::reports::RollupRequest { year, heatmap, rep };
            commands::reports::rollup(&options, &request, &filters)
        }
        Command::Simulate { iterations, seed, filters } => {
            let mut options = options.clone();
            options.overrides.simulation_iterations = iterations;
            options.overrides.simulation_seed = seed;
            commands::reports::simulate(&options, &filters)
        }
    };

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", result.output).context("failed to write command output")?;
    Ok(ExitCode::from(result.exit_code))
}
