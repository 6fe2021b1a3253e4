//! Flight delay feature pipeline CLI
//!
//! Prepares training tables from flight schedules and runs the inference
//! feature path on single records.

use clap::{Parser, Subcommand};
use flight_delay::{Config, Result};

#[derive(Parser)]
#[command(name = "delay")]
#[command(about = "Feature pipeline for flight delay prediction", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new project with default config
    Init,
    /// Run the training path and write train/val/test tables
    Prepare {
        /// Flight schedule CSV (defaults to the configured dataset)
        #[arg(long)]
        input: Option<String>,
        /// Output directory for the split tables
        #[arg(long)]
        output: Option<String>,
    },
    /// Show temporal features derived from a scheduled departure
    Features {
        /// Timestamp as "YYYY-MM-DD HH:MM:SS"
        timestamp: String,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Encode one JSON flight record with the persisted encoder
    Transform {
        /// JSON file holding a single record
        record: String,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use table, json, or csv.", s)),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let result = match cli.command {
        Commands::Init => commands::init(&cli.config),
        Commands::Prepare { input, output } => commands::prepare(&config, input, output),
        Commands::Features { timestamp, format } => commands::features(&timestamp, format),
        Commands::Transform { record, format } => commands::transform(&config, &record, format),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use flight_delay::data::{load_records, TrainingOptions, TrainingSet};
    use flight_delay::features::{OneHotEncoder, TemporalContext};
    use flight_delay::predict::{FeaturePreprocessor, InferenceOptions};
    use flight_delay::training::{split_table, SplitRatios};
    use flight_delay::{DelayError, FeatureConfig, FlightRecord};
    use std::path::Path;

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        let feature_path = Path::new(&config.data.feature_config_path);
        if !feature_path.exists() {
            create_parent(feature_path)?;
            let json = serde_json::to_string_pretty(&FeatureConfig::default())?;
            std::fs::write(feature_path, json)?;
            println!("Created default feature config at {}", feature_path.display());
        }
        create_parent(Path::new(&config.data.encoder_path))?;
        std::fs::create_dir_all(&config.data.output_dir)?;

        println!("\nNext steps:");
        println!("  1. Edit {} to customize settings", config_path);
        println!("  2. Place the flight schedule at {}", config.data.dataset_path);
        println!("  3. Run 'delay prepare' to build the training tables");
        println!("  4. Run 'delay transform <record.json>' to encode a single flight");

        Ok(())
    }

    pub fn prepare(config: &Config, input: Option<String>, output: Option<String>) -> Result<()> {
        let input = input.unwrap_or_else(|| config.data.dataset_path.clone());
        let output = output.unwrap_or_else(|| config.data.output_dir.clone());
        let feature_config = load_feature_config(config)?;

        let records = load_records(&input)?;
        let set = TrainingSet::build(&records, &feature_config, &TrainingOptions::from_config(config))?;

        let encoder_path = Path::new(&config.data.encoder_path);
        create_parent(encoder_path)?;
        set.encoder.save(encoder_path)?;
        log::info!("Saved encoder to {}", encoder_path.display());

        let splits = split_table(&set.table, SplitRatios::from_config(config), config.split.seed)?;

        let output = Path::new(&output);
        std::fs::create_dir_all(output)?;
        for (name, table) in [
            ("train", &splits.train),
            ("val", &splits.val),
            ("test", &splits.test),
        ] {
            let path = output.join(format!("{}.csv", name));
            table.write_csv(&path, &feature_config.target)?;
            log::info!(
                "Wrote {} ({} rows, {} delayed)",
                path.display(),
                table.len(),
                table.positives()
            );
        }

        println!(
            "Prepared {} rows x {} features from {} flights",
            set.table.len(),
            set.table.width(),
            records.len()
        );
        Ok(())
    }

    pub fn features(timestamp: &str, format: OutputFormat) -> Result<()> {
        let ctx = TemporalContext::from_timestamp(timestamp)?;

        match format {
            OutputFormat::Table => {
                println!("Scheduled:      {}", timestamp);
                println!("High season:    {}", ctx.high_season);
                println!("Day phase:      {}", ctx.day_phase);
                println!("Weekday:        {}", ctx.calendar.weekday);
                println!("Month:          {}", ctx.calendar.month);
                println!("Day:            {}", ctx.calendar.day);
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&ctx)?);
            }
            OutputFormat::Csv => {
                println!("is_high_season,day_phase,Day-I,Month-I,Day-Number-I");
                println!(
                    "{},{},{},{},{}",
                    u8::from(ctx.high_season),
                    ctx.day_phase,
                    ctx.calendar.weekday,
                    ctx.calendar.month,
                    ctx.calendar.day
                );
            }
        }
        Ok(())
    }

    pub fn transform(config: &Config, record_path: &str, format: OutputFormat) -> Result<()> {
        let content = std::fs::read_to_string(record_path)?;
        let record: FlightRecord = serde_json::from_str(&content)?;

        let encoder_path = &config.data.encoder_path;
        if !Path::new(encoder_path).exists() {
            return Err(DelayError::Config(format!(
                "No encoder at {}, run 'delay prepare' first",
                encoder_path
            )));
        }
        let preprocessor = FeaturePreprocessor::new(
            OneHotEncoder::load(encoder_path)?,
            load_feature_config(config)?,
            InferenceOptions::from_config(config),
        )?;
        let out = preprocessor.preprocess(&record)?;

        match format {
            OutputFormat::Table => {
                for (name, value) in out.row.columns.iter().zip(&out.row.values) {
                    println!("{:<32} {}", name, value);
                }
                for unknown in &out.unknown {
                    println!("(unknown {} = {:?})", unknown.column, unknown.value);
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
            OutputFormat::Csv => {
                println!("{}", out.row.columns.join(","));
                let values: Vec<String> = out.row.values.iter().map(|v| v.to_string()).collect();
                println!("{}", values.join(","));
            }
        }
        Ok(())
    }

    fn load_feature_config(config: &Config) -> Result<FeatureConfig> {
        let path = &config.data.feature_config_path;
        if Path::new(path).exists() {
            FeatureConfig::load(path)
        } else {
            log::warn!("No feature config at {}, using defaults", path);
            Ok(FeatureConfig::default())
        }
    }

    fn create_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}
