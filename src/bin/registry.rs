//! Schema Registry admin CLI
//!
//! Drives the registry lifecycle over the file-backed store named in the
//! configuration.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use exchange_schemas::{
    ActivateOptions, ChangeType, CompatibilityReport, Context, RegistryConfig, RegistryError, SchemaRegistry,
    Submission, VersionStatus,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-registry")]
#[command(about = "Manage exchange schema versions")]
#[command(version)]
struct Cli {
    /// Config file (defaults to registry.toml lookup)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Actor recorded on audit events
    #[arg(long, global = true)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate an SDL file
    Validate { file: PathBuf },

    /// Submit an SDL file as a new Draft version
    Submit {
        file: PathBuf,
        /// Version (e.g. v2, 1.3.0); derived from the change type if omitted
        #[arg(short, long, default_value = "")]
        version: String,
        /// Declared change type: major, minor or patch
        #[arg(short = 't', long, default_value = "minor")]
        change_type: ChangeType,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Evaluate a Draft against the Active version
    Evaluate { version: String },

    /// Make an Inactive version Active
    Activate {
        version: String,
        /// Run contract tests first
        #[arg(long)]
        contract_tests: bool,
        /// Fail when any contract test fails
        #[arg(long)]
        strict: bool,
    },

    /// Step a version down (Active to Inactive, Inactive to Deprecated)
    Deactivate { version: String },

    /// Delete a version that was never Active
    Delete { version: String },

    /// List versions, newest first
    List {
        #[arg(short, long)]
        status: Option<VersionStatus>,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        #[arg(short, long, default_value_t = 0)]
        offset: usize,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the Active version
    Active {
        /// Print the SDL as well
        #[arg(long)]
        sdl: bool,
    },

    /// Compare an SDL file against the Active version without storing it
    Check {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },

    /// Show evaluation and activation history for a version
    History { version: String },

    /// Run contract tests against a stored version
    ContractTest { version: String },

    /// Print the effective configuration, or write it to a file
    Config {
        #[arg(long)]
        init: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match RegistryConfig::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: failed to load configuration: {}", e);
            std::process::exit(2);
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli, config) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn read_sdl(path: &PathBuf) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn print_report(report: &CompatibilityReport) {
    println!("   inferred change: {}", report.inferred_change_type);
    for change in &report.breaking_changes {
        println!("   ❌ {}", change);
    }
    for warning in &report.warnings {
        println!("   ⚠️  {}", warning);
    }
}

fn run(cli: Cli, config: RegistryConfig) -> anyhow::Result<()> {
    if let Commands::Config { init } = &cli.command {
        match init {
            Some(path) => {
                config.save(path).with_context(|| format!("writing {}", path))?;
                println!("✅ Wrote configuration to {}", path);
            }
            None => print!("{}", toml::to_string_pretty(&config)?),
        }
        return Ok(());
    }

    let registry = SchemaRegistry::open(&config)?;
    let ctx = match &cli.actor {
        Some(actor) => Context::background().with_actor(actor.clone()),
        None => Context::background(),
    };

    match cli.command {
        Commands::Validate { file } => {
            let schema = registry.validate_sdl(&read_sdl(&file)?)?;
            println!(
                "✅ {} is valid: {} types, {} fields",
                file.display(),
                schema.type_count(),
                schema.field_count()
            );
        }

        Commands::Submit {
            file,
            version,
            change_type,
            notes,
        } => {
            let mut submission = Submission::new(version, read_sdl(&file)?, change_type);
            if let Some(notes) = notes {
                submission = submission.with_notes(notes);
            }
            let row = registry.submit(&submission, &ctx)?;
            println!("📝 {} checksum {}", row, row.checksum.short());
        }

        Commands::Evaluate { version } => match registry.evaluate(&version, &ctx) {
            Ok(report) => {
                println!("✅ {} accepted", version);
                print_report(&report);
            }
            Err(RegistryError::Compatibility { report, declared, .. }) => {
                println!("❌ {} rejected (declared {})", version, declared);
                print_report(&report);
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        },

        Commands::Activate {
            version,
            contract_tests,
            strict,
        } => {
            let defaults = ActivateOptions::from(&config.contract_tests);
            let options = ActivateOptions {
                run_contract_tests: contract_tests || defaults.run_contract_tests,
                strict: strict || defaults.strict,
            };
            let activation = registry.activate(&version, options, &ctx)?;
            println!("🚀 {} is now Active", activation.version);
            if let Some(previous) = &activation.previous {
                println!("   v{} deprecated", previous);
            }
            if let Some(results) = &activation.contract_tests {
                println!("   contract tests: {}/{} passed", results.passed, results.total);
            }
        }

        Commands::Deactivate { version } => {
            let status = registry.deactivate(&version, &ctx)?;
            println!("⏸️  {} is now {}", version, status);
            if status == VersionStatus::Inactive {
                println!("⚠️  No version is Active");
            }
        }

        Commands::Delete { version } => {
            registry.delete(&version, &ctx)?;
            println!("🗑️  Deleted {}", version);
        }

        Commands::List {
            status,
            limit,
            offset,
            json,
        } => {
            let page = registry.list(status, limit, offset)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
            } else {
                println!("📦 {} of {} versions", page.versions.len(), page.total);
                for v in &page.versions {
                    println!(
                        "  {:<12} {:<10} {:<6} {}  {}",
                        v.tag_string(),
                        v.status,
                        v.change_type,
                        v.created_at.format("%Y-%m-%d %H:%M"),
                        v.created_by
                    );
                }
            }
        }

        Commands::Active { sdl } => {
            let active = registry.get_active()?;
            println!("🟢 {} ({} by {})", active, active.change_type, active.created_by);
            if sdl {
                println!("{}", active.sdl);
            }
        }

        Commands::Check { file, json } => {
            let report = registry.check_compatibility(&read_sdl(&file)?)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                if report.compatible {
                    println!("✅ Compatible with the Active version");
                } else {
                    println!("❌ Breaking changes against the Active version");
                }
                print_report(&report);
            }
            if !report.compatible {
                std::process::exit(1);
            }
        }

        Commands::History { version } => {
            let records = registry.history(&version)?;
            if records.is_empty() {
                println!("No history for {}", version);
            }
            for record in records {
                let from = record
                    .from_version
                    .map(|v| format!("v{}", v))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {} {:?} {} -> v{} ({}, {} breaking, {} warnings) by {}",
                    record.created_at.format("%Y-%m-%d %H:%M:%S"),
                    record.kind,
                    from,
                    record.to_version,
                    record.change_type,
                    record.breaking_changes.len(),
                    record.warnings.len(),
                    record.created_by
                );
            }
        }

        Commands::ContractTest { version } => {
            let results = registry.run_contract_tests(&version)?;
            println!("🧪 {}/{} contract tests passed", results.passed, results.total);
            for failure in results.failures() {
                println!(
                    "   ❌ {}: {}",
                    failure.test_name,
                    failure.error.as_deref().unwrap_or("failed")
                );
            }
            if !results.all_passed() {
                std::process::exit(1);
            }
        }

        Commands::Config { .. } => unreachable!("handled before opening the registry"),
    }

    Ok(())
}
