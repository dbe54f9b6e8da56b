mod cli;
mod prompts;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};

use vuid_core::{
    analyze, extract, get_config_dir, load_document, reconcile, write_header, Config, Database,
    DatabaseFile, DocumentRequest, EntrySet, Extraction, MatchKind, ReconcileReport,
    Reconciliation, RemapTable, Stats, Validation,
};

use crate::cli::{Cli, Command, SourceArgs};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let (config, config_path) = Config::resolve(cli.config.as_deref())?;
    if let Some(path) = &config_path {
        log::debug!("Loaded configuration from {:?}", path);
    }

    match cli.command {
        Command::Generate {
            source,
            out,
            gendb,
            compare,
            update,
            remap,
            force,
            interactive,
            report,
        } => {
            let (compare, gendb) = database_paths(&config, compare, gendb, update);
            let options = GenerateOptions {
                out: out.unwrap_or_else(|| config.header_file.clone()),
                gendb,
                compare,
                update,
                remap,
                force,
                interactive,
                report,
            };
            generate(&config, &source, options)?;
        }
        Command::Analyze { source } => {
            let extraction = load_and_extract(&config, &source)?;
            print_stats(&analyze(&extraction.entries, extraction.implicit_count));
        }
        Command::CheckRemap { expression } => check_remap(&expression)?,
        Command::InitConfig { path } => init_config(path)?,
    }

    Ok(())
}

/// Warnings only by default; RUST_LOG overrides the verbosity flag
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Database to compare against and database to write.
///
/// `--update` compares against `--compare` (or the configured database) and
/// writes back to that same file. A bare `--gendb` writes to the compared
/// database when there is one.
fn database_paths(
    config: &Config,
    compare: Option<PathBuf>,
    gendb: Option<Option<PathBuf>>,
    update: bool,
) -> (Option<PathBuf>, Option<PathBuf>) {
    let compare = compare.or_else(|| update.then(|| config.database_file.clone()));
    let default_db = || compare.clone().unwrap_or_else(|| config.database_file.clone());
    let gendb = match gendb {
        Some(path) => Some(path.unwrap_or_else(default_db)),
        None if update => Some(default_db()),
        None => None,
    };
    (compare, gendb)
}

struct GenerateOptions {
    out: PathBuf,
    gendb: Option<PathBuf>,
    compare: Option<PathBuf>,
    update: bool,
    remap: Option<String>,
    force: bool,
    interactive: bool,
    report: Option<PathBuf>,
}

fn generate(config: &Config, source: &SourceArgs, options: GenerateOptions) -> Result<()> {
    let remap = match &options.remap {
        Some(_) if !options.update => {
            bail!("--remap can only be used along with --update")
        }
        Some(expression) => RemapTable::parse(expression)
            .with_context(|| format!("Invalid remap expression '{}'", expression))?,
        None => RemapTable::new(),
    };

    let extraction = load_and_extract(config, source)?;
    let stats = analyze(&extraction.entries, extraction.implicit_count);
    print_stats(&stats);

    let (entries, prior) = match &options.compare {
        Some(db_path) => {
            let prior = DatabaseFile::new(db_path).load()?;
            for skipped in prior.skipped() {
                println!(
                    "{} line {}: {} ({})",
                    "Skipped database record".yellow(),
                    skipped.line_number,
                    skipped.line,
                    skipped.reason
                );
            }

            let result = reconcile(&extraction.entries, &prior, &remap);
            let validation = result.validate();
            print_reconciliation(&result, &validation);

            if let Some(path) = &options.report {
                ReconcileReport::new(&result, validation.clone(), &stats, prior.skipped())
                    .write_json(path)?;
                println!("Report written to {}", path.display());
            }

            if !validation.ok {
                println!(
                    "{} original database had {} unique ids, updated entries have {}",
                    "Validation failed:".red().bold(),
                    validation.prior_count,
                    validation.reconciled_count
                );
                let accepted = if options.force {
                    println!("{}", "Continuing because of --force".yellow());
                    true
                } else if options.interactive {
                    prompts::confirm_failed_validation(&validation)?
                } else {
                    false
                };
                if !accepted {
                    bail!("Validation failed; nothing was written");
                }
            }

            (result.entries, prior)
        }
        None => {
            if options.report.is_some() {
                log::warn!("--report has no effect without --compare or --update");
            }
            (extraction.entries, Database::new())
        }
    };

    if let Some(db_path) = &options.gendb {
        save_database(db_path, &entries, &prior, config)?;
    }

    println!("Writing out header to '{}'", options.out.display());
    write_header(&options.out, &entries, config)?;
    Ok(())
}

fn load_and_extract(config: &Config, source: &SourceArgs) -> Result<Extraction> {
    let local_path = source.spec.as_deref().unwrap_or(&config.spec_file);
    let document = load_document(&DocumentRequest {
        online: source.online,
        url: &config.spec_url,
        local_path,
        timeout: config.fetch_timeout(),
    })?;
    println!("Loaded {}", document.origin);
    Ok(extract(&document.html, config))
}

fn save_database(path: &Path, entries: &EntrySet, prior: &Database, config: &Config) -> Result<()> {
    println!("Writing database file to '{}'", path.display());
    let db = Database::from_entries(entries, prior);
    DatabaseFile::new(path).save(&db, &config.id_prefix)
}

fn print_stats(stats: &Stats) {
    println!("Found {} unique error enums", stats.unique_ids);
    println!("Found {} implicit valid usage statements", stats.implicit_count);
    if stats.repeat_strings > 0 {
        println!(
            "{}",
            format!("Found {} repeated message strings", stats.repeat_strings).yellow()
        );
    }
}

fn print_reconciliation(result: &Reconciliation, validation: &Validation) {
    for assignment in &result.assignments {
        match assignment.kind {
            MatchKind::Forced => println!(
                "{} {} -> {}",
                "Forced".cyan(),
                assignment.fresh,
                assignment.assigned
            ),
            MatchKind::New => println!(
                "{} {} -> {}",
                "New".green(),
                assignment.fresh,
                assignment.assigned
            ),
            _ => {}
        }
    }

    for warning in &result.warnings {
        println!("{} {}", "Warning:".yellow().bold(), warning);
    }

    for id in &validation.regressions {
        println!(
            "{} {} had a test and/or implementation but is missing from the update",
            "Regression:".red().bold(),
            id
        );
    }

    let allocated = result.allocated().count();
    println!(
        "Reconciled {} entries, {} with new ids",
        result.assignments.len(),
        allocated
    );
}

fn check_remap(expression: &str) -> Result<()> {
    let table = RemapTable::parse(expression)
        .with_context(|| format!("Invalid remap expression '{}'", expression))?;
    for (new, old) in table.iter() {
        println!("{} -> {}", new, old);
    }
    println!("{}", format!("{} remaps", table.len()).green());
    Ok(())
}

fn init_config(path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => get_config_dir()
            .context("Could not determine the user config directory")?
            .join("config.yaml"),
    };

    if Config::create_default(&path)? {
        println!("{} {}", "Created".green(), path.display());
    } else {
        println!("{} {} already exists", "Kept".yellow(), path.display());
    }
    Ok(())
}
