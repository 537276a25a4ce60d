//! Command-line interface for the `mfp` binary.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};
use mfp_common::{ConfigId, Error, OutputFormat, Result};
use mfp_config::{resolve_config, validate, ConfigPaths, PipelineConfig};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::benchmark::hartmann::HARTMANN_FIDELITY_NAME;
use crate::benchmark::prior::DEFAULT_PRIOR_NOISE_SCALE;
use crate::benchmark::{
    BenchResult, Benchmark, Config, MfHartmann, Objective, Pd1Spec, Prior, PriorNoise, PriorSource,
    TabularBenchmark,
};
use crate::download::{default_sources, download_all, DownloadOutcome, DEFAULT_DATA_ROOT};
use crate::logging::LogFormat;
use crate::pd1::{process_pd1, ProcessMode, ProcessOptions, ProcessSummary};

/// Name of the downloaded PD1 tarball inside its data directory.
pub const PD1_TARBALL: &str = "data.tar.gz";

#[derive(Debug, Parser)]
#[command(name = "mfp", version, about = "Multi-fidelity benchmark data tools")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output format for command results on stdout.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,

    /// Log line format on stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Turn the PD1 tarball into per-dataset tables.
    Process(ProcessArgs),
    /// Download benchmark data sources.
    Download(DownloadArgs),
    /// Look up a configuration in a tabular PD1 or synthetic benchmark.
    Query(QueryArgs),
    /// Inspect or validate the pipeline configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Args)]
pub struct ProcessArgs {
    /// Directory holding data.tar.gz; outputs are written here.
    #[arg(long, default_value = "./data/pd1-data")]
    pub data_dir: PathBuf,

    /// Produce re-indexed tabular tables instead of surrogate tables.
    #[arg(long, alias = "process_for_tabular")]
    pub process_for_tabular: bool,

    /// Pipeline configuration file (JSON).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    #[arg(long, default_value = DEFAULT_DATA_ROOT)]
    pub data_dir: PathBuf,

    /// Remove and re-download sources that already exist.
    #[arg(long)]
    pub force: bool,

    /// Only download the named sources.
    #[arg(long, num_args = 1..)]
    pub only: Vec<String>,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Benchmark name, e.g. cifar100-wide_resnet-2048 or mfh3_good.
    #[arg(long)]
    pub benchmark: String,

    /// Directory holding the tabular Parquet files.
    #[arg(long, default_value = "./data/pd1-data")]
    pub data_dir: PathBuf,

    /// Configuration id assigned during re-indexing.
    #[arg(long, conflicts_with_all = ["hp", "use_prior"], required_unless_present_any = ["hp", "use_prior"])]
    pub id: Option<u32>,

    /// Hyperparameter assignment `name=value`, repeatable.
    #[arg(long, num_args = 1.., conflicts_with = "use_prior")]
    pub hp: Vec<String>,

    /// Prior: a preset name or a JSON file of `name: value` pairs.
    #[arg(long)]
    pub prior: Option<String>,

    /// Seed for noise added to the prior.
    #[arg(long, requires = "prior")]
    pub prior_noise_seed: Option<u64>,

    /// Scale of the prior noise in the unit space of each hyperparameter.
    #[arg(long, default_value_t = DEFAULT_PRIOR_NOISE_SCALE)]
    pub prior_noise_scale: f64,

    /// Query the prior configuration.
    #[arg(long, requires = "prior")]
    pub use_prior: bool,

    /// Seed of the synthetic benchmark noise.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Override the synthetic benchmark bias.
    #[arg(long)]
    pub bias: Option<f64>,

    /// Override the synthetic benchmark noise.
    #[arg(long)]
    pub noise: Option<f64>,

    /// Fidelity to query; defaults to the largest.
    #[arg(long, conflicts_with = "trajectory")]
    pub at: Option<i64>,

    /// Read the strided sub-epoch table.
    #[arg(long)]
    pub stride: Option<u32>,

    /// Report every fidelity instead of a single one.
    #[arg(long)]
    pub trajectory: bool,
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration and where it came from.
    Show {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the JSON schema of configuration files.
    Schema,
    /// Validate a configuration file, or the effective configuration.
    Validate { file: Option<PathBuf> },
}

/// Run a parsed command line.
pub fn run(cli: &Cli) -> Result<()> {
    let out = io::stdout();
    let mut out = out.lock();
    match &cli.command {
        Command::Process(args) => run_process(args, cli.format, &mut out),
        Command::Download(args) => run_download(args, cli.format, &mut out),
        Command::Query(args) => run_query(args, cli.format, &mut out),
        Command::Config { action } => run_config(action, cli.format, &mut out),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let (config, source) = resolve_config(&ConfigPaths::discover(path))?;
    info!(source = %source, "loaded pipeline configuration");
    Ok(config)
}

fn run_process(args: &ProcessArgs, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let mode = ProcessMode::from_tabular_flag(args.process_for_tabular);
    let options = ProcessOptions::new(mode).with_config(config);
    let summary = process_pd1(&args.data_dir.join(PD1_TARBALL), &options)?;
    render_process(&summary, format, out)
}

fn render_process(summary: &ProcessSummary, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let doc = json!({
                "manifest_path": summary.manifest_path,
                "manifest": summary.manifest,
                "tables": summary.tables,
                "reindexed": summary.reindexed,
            });
            writeln!(out, "{}", serde_json::to_string_pretty(&doc)?)?;
        }
        OutputFormat::Jsonl => {
            for table in &summary.tables {
                writeln!(out, "{}", serde_json::to_string(table)?)?;
            }
        }
        OutputFormat::Human => {
            writeln!(
                out,
                "run {} ({}): {} tables",
                summary.manifest.run_id,
                summary.manifest.mode,
                summary.tables.len()
            )?;
            for table in &summary.tables {
                writeln!(out, "  {:<40} {:>9} rows  {}", table.key.to_string(), table.rows, table.path.display())?;
            }
            for report in &summary.reindexed {
                writeln!(
                    out,
                    "  reindexed {}: {} configs ({} dropped), {} files",
                    report.source.display(),
                    report.configs,
                    report.dropped_configs,
                    report.written.len()
                )?;
            }
            writeln!(out, "manifest: {}", summary.manifest_path.display())?;
        }
    }
    Ok(())
}

fn run_download(args: &DownloadArgs, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    let mut sources = default_sources(&args.data_dir);
    if !args.only.is_empty() {
        if let Some(unknown) = args
            .only
            .iter()
            .find(|name| !sources.iter().any(|s| s.name() == name.as_str()))
        {
            let known: Vec<_> = sources.iter().map(|s| s.name()).collect();
            return Err(Error::Config(format!(
                "unknown source '{unknown}', expected one of {}",
                known.join(", ")
            )));
        }
        sources.retain(|s| args.only.iter().any(|name| name == s.name()));
    }

    let outcomes = download_all(&args.data_dir, args.force, &sources)?;
    render_list(&outcomes, format, out, |o: &DownloadOutcome| {
        format!("{:<16} {:?}  {}", o.name, o.status, o.path.display())
    })
}

#[derive(Debug, Serialize)]
struct QueryOutput<'a> {
    benchmark: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<ConfigId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prior: Option<&'a Config>,
    results: Vec<BenchResult>,
}

fn load_prior(args: &QueryArgs, preset: impl Fn(&str) -> Option<Config>) -> Result<Option<Prior>> {
    let Some(source) = args.prior.as_deref() else {
        return Ok(None);
    };
    let prior = Prior::load(PriorSource::parse(source), preset)?;
    Ok(Some(match args.prior_noise_seed {
        Some(seed) => prior.with_noise(PriorNoise::new(seed).with_scale(args.prior_noise_scale)),
        None => prior,
    }))
}

/// The configuration named on the command line: the prior or `--hp`.
fn chosen_config(args: &QueryArgs, bench: &impl Benchmark) -> Result<Config> {
    if args.use_prior {
        return bench
            .prior()
            .cloned()
            .ok_or_else(|| Error::InvalidConfig("no prior set".to_string()));
    }
    Config::parse_assignments(&args.hp)
}

fn run_query(args: &QueryArgs, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    let spec = match Pd1Spec::lookup(&args.benchmark) {
        Ok(spec) => spec,
        Err(_) => return run_synthetic_query(args, format, out),
    };
    let mut bench = TabularBenchmark::open(&args.data_dir, spec, args.stride)?;
    if let Some(prior) = load_prior(args, |_| None)? {
        bench = bench.with_prior(prior)?;
    }

    let (id, config) = match args.id {
        Some(id) => {
            let id = ConfigId(id);
            (id, bench.config_by_id(id)?)
        }
        None => {
            let config = chosen_config(args, &bench)?;
            spec.validate(&config)?;
            (bench.resolve(&config)?, config)
        }
    };
    debug!(benchmark = spec.name, id = %id, config = %config, "resolved configuration");
    let doc = QueryOutput {
        benchmark: spec.name,
        id: Some(id),
        prior: bench.prior(),
        results: evaluate(&bench, &config, args)?,
    };
    let header = format!("{} id={} {}", spec.name, id, config);
    report(&doc, format, out, &header, [spec.fidelity_name, "valid_error_rate", "train_cost"])
}

fn run_synthetic_query(args: &QueryArgs, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    let mut bench = MfHartmann::lookup(&args.benchmark, args.seed)?.with_bias_noise(args.bias, args.noise);
    let function = bench.function();
    if let Some(prior) = load_prior(args, |name| function.preset(name))? {
        bench = bench.with_prior(prior)?;
    }
    if args.id.is_some() {
        return Err(Error::InvalidConfig(format!(
            "{} has no configuration ids, use --hp or --use-prior",
            bench.name()
        )));
    }
    let config = chosen_config(args, &bench)?;
    debug!(benchmark = bench.name(), config = %config, "resolved configuration");
    let doc = QueryOutput {
        benchmark: bench.name(),
        id: None,
        prior: bench.prior(),
        results: evaluate(&bench, &config, args)?,
    };
    let header = format!("{} {}", bench.name(), config);
    report(&doc, format, out, &header, [HARTMANN_FIDELITY_NAME, "value", "cost"])
}

fn evaluate(bench: &impl Benchmark, config: &Config, args: &QueryArgs) -> Result<Vec<BenchResult>> {
    if args.trajectory {
        bench.trajectory(config, None, None, None)
    } else {
        Ok(vec![bench.query(config, args.at)?])
    }
}

fn report(
    doc: &QueryOutput<'_>,
    format: OutputFormat,
    out: &mut impl Write,
    header: &str,
    columns: [&str; 3],
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(doc)?)?;
            Ok(())
        }
        OutputFormat::Jsonl | OutputFormat::Human => {
            if format == OutputFormat::Human {
                let [fidelity, metric, cost] = columns;
                writeln!(out, "{header}")?;
                writeln!(out, "{fidelity:>8}  {metric:>16}  {cost:>14}")?;
            }
            render_list(&doc.results, format, out, |r: &BenchResult| {
                let shown = match r.objective {
                    Objective::ErrorRate => r.valid_error_rate,
                    Objective::Value => r.score(),
                };
                format!("{:>8}  {:>16.6}  {:>14.4}", r.fidelity, shown, r.cost())
            })
        }
    }
}

fn run_config(action: &ConfigAction, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    match action {
        ConfigAction::Show { config } => {
            let (effective, source) = resolve_config(&ConfigPaths::discover(config.as_deref()))?;
            let doc = json!({ "source": source.to_string(), "config": effective });
            writeln!(out, "{}", serde_json::to_string_pretty(&doc)?)?;
        }
        ConfigAction::Schema => {
            writeln!(out, "{}", serde_json::to_string_pretty(&PipelineConfig::json_schema())?)?;
        }
        ConfigAction::Validate { file } => {
            let (config, source) = match file {
                Some(path) => {
                    let text = fs::read_to_string(path)?;
                    let config: PipelineConfig = serde_json::from_str(&text)
                        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
                    (config, path.display().to_string())
                }
                None => {
                    let (config, source) = resolve_config(&ConfigPaths::discover(None))?;
                    (config, source.to_string())
                }
            };
            let result = validate(&config);
            if format.is_machine_readable() {
                let errors: Vec<String> = result.errors.iter().map(ToString::to_string).collect();
                let doc = json!({
                    "source": source,
                    "valid": result.is_valid(),
                    "errors": errors,
                    "warnings": result.warnings,
                });
                writeln!(out, "{}", serde_json::to_string_pretty(&doc)?)?;
            } else {
                for warning in &result.warnings {
                    writeln!(out, "warning: {warning}")?;
                }
                for error in &result.errors {
                    writeln!(out, "error: {error}")?;
                }
                if result.is_valid() {
                    writeln!(out, "{source}: valid")?;
                }
            }
            if !result.is_valid() {
                return Err(Error::SchemaValidation(result.to_string()));
            }
        }
    }
    Ok(())
}

fn render_list<T: Serialize>(
    items: &[T],
    format: OutputFormat,
    out: &mut impl Write,
    human: impl Fn(&T) -> String,
) -> Result<()> {
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(items)?)?,
        OutputFormat::Jsonl => {
            for item in items {
                writeln!(out, "{}", serde_json::to_string(item)?)?;
            }
        }
        OutputFormat::Human => {
            for item in items {
                writeln!(out, "{}", human(item))?;
            }
        }
    }
    Ok(())
}
