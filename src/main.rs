use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};

use vpr_dashboard::config::Config;
use vpr_dashboard::data::filter::{FilterUpdate, ALL};
use vpr_dashboard::data::generator::generate_mock;
use vpr_dashboard::data::loader::load_dir;
use vpr_dashboard::data::model::RecordStore;
use vpr_dashboard::report;
use vpr_dashboard::state::AppState;

#[derive(Parser)]
#[command(name = "vpr-dashboard", version)]
#[command(about = "Assessment results and objectivity markers by year, grade, subject and school", long_about = None)]
struct Cli {
    /// Config file (defaults to ./vpr-dashboard.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the dashboard for a filter selection
    Report {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        filters: FilterArgs,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Write to a file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// List selectable filter values
    Options {
        #[command(flatten)]
        source: SourceArgs,

        /// Restrict the school list to one municipality
        #[arg(long, default_value = ALL)]
        municipality: String,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Directory with marks.*, scores.* and bias.*
    #[arg(long, value_name = "DIR", env = "VPR_DATA_DIR", conflicts_with = "mock")]
    data_dir: Option<PathBuf>,

    /// Use the built-in demo dataset
    #[arg(long)]
    mock: bool,
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    year: Option<String>,
    #[arg(long)]
    grade: Option<String>,
    #[arg(long)]
    subject: Option<String>,
    #[arg(long)]
    municipality: Option<String>,
    #[arg(long)]
    school: Option<String>,
}

impl From<FilterArgs> for FilterUpdate {
    fn from(args: FilterArgs) -> Self {
        FilterUpdate {
            year: args.year,
            grade: args.grade,
            subject: args.subject,
            municipality: args.municipality,
            school: args.school,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn load_store(config: &Config, source: &SourceArgs) -> Result<RecordStore> {
    if source.mock || (source.data_dir.is_none() && config.data.mock) {
        info!("using generated demo data");
        return Ok(generate_mock());
    }
    let dir = source.data_dir.as_ref().unwrap_or(&config.data.dir);
    load_dir(dir, config.load_options())
        .with_context(|| format!("failed to load records from {}", dir.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Report {
            source,
            filters,
            format,
            out,
        } => {
            let mut state = AppState::new(config.filters.clone());
            state.set_store(load_store(&config, &source)?);

            // School is applied after municipality so an explicit pair survives the reset.
            let mut update = FilterUpdate::from(filters);
            let school = update.school.take();
            state.update_filters(update);
            if school.is_some() {
                state.update_filters(FilterUpdate {
                    school,
                    ..FilterUpdate::default()
                });
            }
            warn_unknown_selection(&state);

            let view = state.view().context("no records loaded")?;
            let rendered = match format {
                Format::Text => report::render_text(view),
                Format::Json => serde_json::to_string_pretty(view)?,
            };
            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Report written to {}.", path.display());
                }
                None => println!("{rendered}"),
            }
        }
        Commands::Options {
            source,
            municipality,
        } => {
            let store = load_store(&config, &source)?;
            let options = &store.options;
            let join = |items: Vec<String>| items.join(", ");
            println!("Years: {}", join(options.years.iter().map(|y| y.to_string()).collect()));
            println!("Grades: {}", join(options.grades.iter().map(|g| g.to_string()).collect()));
            println!("Subjects: {}", options.subjects.join(", "));
            println!("Municipalities: {}", options.municipalities.join(", "));
            println!("Schools:");
            for school in options.schools(&municipality) {
                println!("- {school}");
            }
        }
    }

    Ok(())
}

/// Selections outside the loaded options are legal but always empty.
fn warn_unknown_selection(state: &AppState) {
    let Some(store) = &state.store else {
        return;
    };
    let filters = state.filters();
    let options = &store.options;
    if !options.years.iter().any(|y| y.to_string() == filters.year) {
        warn!("year {} not present in mark records", filters.year);
    }
    if !options.subjects.contains(&filters.subject) {
        warn!("subject {} not present in mark records", filters.subject);
    }
    if !filters.all_municipalities() && !options.municipalities.contains(&filters.municipality) {
        warn!("municipality {} not present in mark records", filters.municipality);
    }
    if !filters.all_schools() && !options.schools(&filters.municipality).contains(&filters.school) {
        warn!("school {} not present in {}", filters.school, filters.municipality);
    }
}
