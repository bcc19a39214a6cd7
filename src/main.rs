//! `powder` command line: ask for a recommendation, run evals, manage data.

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info};

use powder::agent::SkiAgent;
use powder::evals::backtest::{EstimatedDriveTime, ReplayConditions, load_fixture};
use powder::evals::fetch_historic::{self, HistoricIndex};
use powder::evals::interesting_days::{self, Category};
use powder::evals::runner;
use powder::llm::{AnthropicClient, LanguageModel, build_model};
use powder::mountains::validate_mountain;
use powder::providers::{
    ConditionsProvider, DriveTimeProvider, OpenMeteoConditions, OpenRouteServiceRoutes,
};
use powder::trace::{Mode, TraceMeta, save_trace};
use powder::pipeline::clarify_date;
use powder::{MountainStore, PowderConfig, PowderError, SkiPipeline, UserLocation, cache, geo, location, logging};

#[derive(Parser, Debug)]
#[command(name = "powder")]
#[command(version)]
#[command(about = "Powder - ski mountain recommendations for the Northeast")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (default: <config dir>/powder/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Skip the persistent forecast and route cache
    #[arg(long, global = true)]
    no_cache: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask where to ski; without a query, starts an interactive session
    Ask(AskArgs),
    /// Run the evaluation suite
    Eval(EvalArgs),
    /// Download historic weather for every mountain into the fixtures directory
    FetchHistoric(FetchHistoricArgs),
    /// List fixture days that make good test cases
    InterestingDays(InterestingDaysArgs),
    /// Load mountains from a JSON-lines file into the database
    Seed(SeedArgs),
    /// Check a mountain record given as JSON
    ValidateMountain {
        /// Mountain record, e.g. '{"name": "Stowe", "state": "VT", ...}'
        json: String,
    },
}

#[derive(Args, Debug)]
struct AskArgs {
    /// Natural language query, e.g. "Best powder day with Ikon pass?"
    query: Option<String>,

    /// Replay historic conditions from this date (YYYY-MM-DD)
    #[arg(long)]
    date: Option<NaiveDate>,

    #[arg(long, value_enum, default_value = "agent")]
    mode: Mode,

    /// Starting point: boston, nyc, hartford, albany, "lat,lon" or a place name
    #[arg(long)]
    location: Option<String>,

    /// Model in provider/model form
    #[arg(long)]
    model: Option<String>,

    /// Write the run, with every model call, to the traces directory
    #[arg(long)]
    save_trace: bool,
}

#[derive(Args, Debug)]
struct EvalArgs {
    #[arg(long)]
    model: Option<String>,

    /// Write the JSON report here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip the end-to-end suite
    #[arg(long)]
    signatures_only: bool,
}

#[derive(Args, Debug)]
struct FetchHistoricArgs {
    #[arg(long, default_value_t = fetch_historic::default_start())]
    start: NaiveDate,

    #[arg(long, default_value_t = fetch_historic::default_end())]
    end: NaiveDate,

    /// Output directory (default: configured fixtures directory)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Summarize existing fixtures instead of fetching
    #[arg(long)]
    summary: bool,
}

#[derive(Args, Debug)]
struct InterestingDaysArgs {
    /// Fixtures directory (default: configured fixtures directory)
    #[arg(long)]
    fixtures: Option<PathBuf>,

    #[arg(long, default_value_t = 10)]
    limit: usize,

    #[arg(long, value_enum, default_value = "all")]
    category: Category,

    /// Show every mountain on this date instead
    #[arg(long)]
    date: Option<String>,

    /// Emit JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SeedArgs {
    /// JSON-lines file (default: configured seed path)
    #[arg(long)]
    input: Option<PathBuf>,

    /// SQLite database (default: configured database path)
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Validation needs no configuration, logging or network
    if let Command::ValidateMountain { json } = &cli.command {
        return validate_command(json);
    }

    let mut config = match PowderConfig::load_from_path(cli.config.clone()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    if cli.no_cache {
        config.cache.enabled = false;
    }

    if let Err(err) = logging::init(&config.logging, cli.verbose) {
        eprintln!("Warning: {err:#}");
    }

    match run(cli, config).await {
        Ok(code) => code,
        Err(err) => {
            let message = err
                .downcast_ref::<PowderError>()
                .map_or_else(|| format!("{err:#}"), PowderError::user_message);
            eprintln!("Error: {message}");
            debug!(error = ?err, "Command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: PowderConfig) -> Result<ExitCode> {
    match cli.command {
        Command::Ask(args) => ask_command(&config, args).await,
        Command::Eval(args) => eval_command(&config, args, cli.verbose).await,
        Command::FetchHistoric(args) => fetch_historic_command(&config, args).await,
        Command::InterestingDays(args) => interesting_days_command(&config, &args),
        Command::Seed(args) => seed_command(&config, args),
        Command::ValidateMountain { json } => Ok(validate_command(&json)),
    }
}

fn init_cache(config: &PowderConfig) {
    if !config.cache.enabled {
        info!("Persistent cache disabled");
        return;
    }
    let path = config.cache.resolved_location();
    if let Err(err) = cache::init(&path) {
        // Runs fine without it, just slower
        tracing::warn!(path = %path.display(), error = %err, "Cache unavailable");
    }
}

fn open_store(config: &PowderConfig) -> Result<MountainStore> {
    let store = MountainStore::open_or_seed(
        Path::new(&config.defaults.database_path),
        Path::new(&config.defaults.seed_path),
    )?;
    Ok(store)
}

/// `None` after printing the missing-key error
fn model_for(config: &PowderConfig, model: Option<&str>) -> Result<Option<AnthropicClient>> {
    let Some(api_key) = config.anthropic_api_key() else {
        println!("Error: ANTHROPIC_API_KEY environment variable not set");
        return Ok(None);
    };
    Ok(Some(build_model(&config.llm, api_key, model)?))
}

/// Weather and routing for a run: replayed fixtures for a historic date,
/// live APIs otherwise
struct Sources {
    conditions: Box<dyn ConditionsProvider>,
    routes: Box<dyn DriveTimeProvider>,
    today: NaiveDate,
}

impl Sources {
    fn live(config: &PowderConfig) -> Self {
        Self {
            conditions: Box::new(OpenMeteoConditions::new(config)),
            routes: Box::new(OpenRouteServiceRoutes::new(config)),
            today: geo::today_in(&config.weather.timezone),
        }
    }

    fn replay(config: &PowderConfig, date: NaiveDate) -> Result<Option<Self>> {
        let fixture = match load_fixture(&date.to_string(), Path::new(&config.defaults.fixtures_dir)) {
            Ok(fixture) => fixture,
            Err(PowderError::NotFound { .. }) => {
                println!("Error: No fixture data for {date}");
                println!("Run 'powder fetch-historic' to fetch weather data, or use a date in range.");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Some(Self {
            conditions: Box::new(ReplayConditions::from_fixture(fixture)?),
            routes: Box::new(EstimatedDriveTime),
            today: date,
        }))
    }
}

async fn ask_command(config: &PowderConfig, args: AskArgs) -> Result<ExitCode> {
    let Some(model) = model_for(config, args.model.as_deref())? else {
        return Ok(ExitCode::FAILURE);
    };
    init_cache(config);

    let sources = match args.date {
        Some(date) => match Sources::replay(config, date)? {
            Some(sources) => sources,
            None => return Ok(ExitCode::FAILURE),
        },
        None => Sources::live(config),
    };
    let store = open_store(config)?;
    let location_input = args.location.as_deref().unwrap_or(&config.defaults.location);
    let location = location::resolve(location_input, &config.weather.geocoding_url).await;
    debug!(location = %location.name, "Starting location");

    let Some(query) = args.query.clone() else {
        interactive(config, &args, &model, &store, &sources, &location).await?;
        return Ok(ExitCode::SUCCESS);
    };
    answer(config, &args, &model, &store, &sources, &location, &query).await?;
    Ok(ExitCode::SUCCESS)
}

async fn interactive(
    config: &PowderConfig,
    args: &AskArgs,
    model: &AnthropicClient,
    store: &MountainStore,
    sources: &Sources,
    location: &UserLocation,
) -> Result<()> {
    println!("Powder - Ski Recommendation Agent");
    println!("{}", "=".repeat(40));
    if let Some(date) = args.date {
        println!("Using historic data from: {date}");
    }
    println!("Type your query (or 'quit' to exit):\n");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!("\nGoodbye!");
            break;
        }
        let query = line.trim();
        if matches!(query.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }
        if query.is_empty() {
            continue;
        }
        if let Err(err) = answer(config, args, model, store, sources, location, query).await {
            println!("Error: {err:#}");
        }
        println!();
    }
    Ok(())
}

async fn answer(
    config: &PowderConfig,
    args: &AskArgs,
    model: &AnthropicClient,
    store: &MountainStore,
    sources: &Sources,
    location: &UserLocation,
    query: &str,
) -> Result<()> {
    let first_call = model.history().len();
    let query = with_day(model, query, sources.today, location).await?;
    let query = query.as_str();

    if let Some(date) = args.date {
        println!("\nUsing historic conditions from {date}");
        println!("{}", "-".repeat(40));
    }

    let (output, result) = match args.mode {
        Mode::Pipeline => {
            let outcome = SkiPipeline::new(model, store, &*sources.conditions, &*sources.routes)
                .with_default_drive_hours(config.defaults.max_drive_hours)
                .run(query, sources.today, location)
                .await?;
            let mut result = serde_json::to_value(&outcome)?;
            if let Value::Object(map) = &mut result {
                map.insert("agent".to_string(), Value::from("pipeline"));
            }
            (outcome.render(), result)
        }
        Mode::Agent => {
            let outcome = SkiAgent::new(model, store, &*sources.conditions, &*sources.routes)
                .run(query, sources.today, location)
                .await?;
            let result = serde_json::json!({
                "agent": "react",
                "recommendation": outcome.recommendation,
                "trajectory": outcome.trajectory,
            });
            (outcome.recommendation, result)
        }
    };

    println!("\n{output}");

    if args.save_trace {
        let meta = TraceMeta::new(query, args.mode, args.date, location, model.name(), Local::now());
        let path = save_trace(
            Path::new(&config.defaults.traces_dir),
            &meta,
            &result,
            &model.history_since(first_call),
        )?;
        println!("\nTrace saved to: {}", path.display());
    }
    Ok(())
}

/// Ask which day an undated query means, when someone is at the terminal
async fn with_day(
    model: &AnthropicClient,
    query: &str,
    today: NaiveDate,
    location: &UserLocation,
) -> Result<String> {
    if !io::stdin().is_terminal() {
        return Ok(query.to_string());
    }
    clarify_date(model, query, today, location, &mut io::stdin().lock(), &mut io::stdout()).await
}

/// `verbose` also lists passing examples
async fn eval_command(config: &PowderConfig, args: EvalArgs, verbose: bool) -> Result<ExitCode> {
    let Some(model) = model_for(config, args.model.as_deref())? else {
        return Ok(ExitCode::FAILURE);
    };
    let store = open_store(config)?;

    let report = runner::run_all(&model, &store, verbose, args.signatures_only).await?;
    if let Some(path) = args.output {
        runner::save_report(&report, &path)?;
    }
    Ok(ExitCode::SUCCESS)
}

async fn fetch_historic_command(config: &PowderConfig, args: FetchHistoricArgs) -> Result<ExitCode> {
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(&config.defaults.fixtures_dir));

    if args.summary {
        println!("{}", fetch_historic::summarize(&output)?);
        return Ok(ExitCode::SUCCESS);
    }

    let mountains = open_store(config)?.all()?;
    fetch_historic::fetch_full_season(&config.weather, &mountains, args.start, args.end, &output).await?;
    println!("\nDone! Fixtures saved to {}", output.display());
    Ok(ExitCode::SUCCESS)
}

fn interesting_days_command(config: &PowderConfig, args: &InterestingDaysArgs) -> Result<ExitCode> {
    let dir = args
        .fixtures
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.defaults.fixtures_dir));
    let index = HistoricIndex::load(&dir)?;

    if let Some(date) = &args.date {
        return match interesting_days::day_details(&index, date) {
            Some(details) => {
                println!("{details}");
                Ok(ExitCode::SUCCESS)
            }
            None => {
                println!("No data for {date}");
                Ok(ExitCode::FAILURE)
            }
        };
    }

    let days = interesting_days::analyze_all(&index);
    if args.json {
        println!("{}", interesting_days::to_json(&days, args.limit)?);
    } else {
        println!("{}", interesting_days::report(&days, args.category, args.limit));
    }
    Ok(ExitCode::SUCCESS)
}

fn seed_command(config: &PowderConfig, args: SeedArgs) -> Result<ExitCode> {
    let input = args
        .input
        .unwrap_or_else(|| PathBuf::from(&config.defaults.seed_path));
    let database = args
        .database
        .unwrap_or_else(|| PathBuf::from(&config.defaults.database_path));

    if let Some(parent) = database.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mountains = MountainStore::load_jsonl(&input)?;
    let mut store = MountainStore::open(&database)?;
    let count = store.seed(&mountains)?;
    println!("Seeded {count} mountains into {}", database.display());
    Ok(ExitCode::SUCCESS)
}

fn validate_command(json: &str) -> ExitCode {
    let data: Value = match serde_json::from_str(json) {
        Ok(data) => data,
        Err(err) => {
            println!("Invalid JSON: {err}");
            return ExitCode::FAILURE;
        }
    };

    let (valid, errors) = validate_mountain(&data);
    if valid {
        println!("Valid");
        ExitCode::SUCCESS
    } else {
        println!("Validation errors:");
        for error in errors {
            println!("  - {error}");
        }
        ExitCode::FAILURE
    }
}
