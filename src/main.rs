//! Binary entry point for contact-dedup.
//!
//! This binary provides the CLI interface for duplicate contact detection.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use contact_dedup::models::{Contact, ContactId, SuggestionId};
use contact_dedup::observability;
use contact_dedup::{AppConfig, DuplicateCommand, DuplicateManager, DuplicateOutcome};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// contact-dedup - Find, review and merge duplicate contacts.
#[derive(Parser)]
#[command(name = "contact-dedup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "CONTACT_DEDUP_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Import contacts from a JSON array.
    Import {
        /// Path to the JSON file.
        file: PathBuf,
    },

    /// List contacts.
    Contacts,

    /// Scan for duplicates and record suggestions.
    Scan,

    /// Show pending duplicate suggestions.
    Pending {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Merge the contacts of a suggestion.
    Merge {
        /// Suggestion ID.
        suggestion_id: String,

        /// Contact to keep (defaults to the suggestion's first contact).
        #[arg(short, long)]
        primary: Option<String>,
    },

    /// Dismiss a suggestion as not-a-duplicate.
    Dismiss {
        /// Suggestion ID.
        suggestion_id: String,
    },

    /// Manage configuration.
    Config {
        /// Show current configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init_from_settings(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Loads configuration from an explicit path or the default locations.
fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from_file(path)
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let config = AppConfig::load_default();
            config.validate()?;
            Ok(config)
        },
    }
}

/// Runs the selected command.
async fn run_command(command: Commands, config: AppConfig) -> Result<()> {
    if let Commands::Config { show } = command {
        cmd_config(&config, show);
        return Ok(());
    }

    let manager = Arc::new(
        DuplicateManager::open(&config)
            .with_context(|| format!("opening {}", config.database_path().display()))?,
    );

    match command {
        Commands::Import { file } => cmd_import(&manager, &file),
        Commands::Contacts => cmd_contacts(&manager),
        Commands::Scan => cmd_scan(manager).await,
        Commands::Pending { json } => cmd_pending(&manager, json),
        Commands::Merge {
            suggestion_id,
            primary,
        } => cmd_merge(&manager, suggestion_id, primary),
        Commands::Dismiss { suggestion_id } => cmd_dismiss(&manager, suggestion_id),
        Commands::Config { .. } => Ok(()),
    }
}

/// Import command.
fn cmd_import(manager: &DuplicateManager, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let contacts: Vec<Contact> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", file.display()))?;

    let inserted = manager.import_contacts(&contacts)?;
    println!("Imported {inserted} contact(s)");
    Ok(())
}

/// Contacts command.
fn cmd_contacts(manager: &DuplicateManager) -> Result<()> {
    let contacts = manager.contacts().list()?;
    if contacts.is_empty() {
        println!("No contacts");
        return Ok(());
    }

    for contact in &contacts {
        let phones: Vec<&str> = contact.phones.iter().map(|p| p.value.as_str()).collect();
        let emails: Vec<&str> = contact.emails.iter().map(|e| e.value.as_str()).collect();
        println!("{}  {}", contact.id, contact.display_name());
        if let Some(org) = &contact.organization {
            println!("    organization: {org}");
        }
        if !phones.is_empty() {
            println!("    phones: {}", phones.join(", "));
        }
        if !emails.is_empty() {
            println!("    emails: {}", emails.join(", "));
        }
        if let Some(birthday) = contact.birthday {
            println!("    birthday: {birthday}");
        }
    }
    println!();
    println!("{} contact(s)", contacts.len());
    Ok(())
}

/// Scan command.
async fn cmd_scan(manager: Arc<DuplicateManager>) -> Result<()> {
    let report = manager.scan_for_duplicates_async().await?;
    println!("Scanned {} contact(s)", report.contacts);
    println!("  detected:   {}", report.detected);
    println!("  new:        {}", report.recorded.inserted);
    println!("  refreshed:  {}", report.recorded.updated);
    println!("  resurfaced: {}", report.recorded.resurfaced);
    println!("  suppressed: {}", report.recorded.suppressed);
    println!("  expired:    {}", report.expired + report.pruned);
    println!("Pending suggestions: {}", report.pending);
    Ok(())
}

/// Pending command.
fn cmd_pending(manager: &DuplicateManager, json: bool) -> Result<()> {
    let DuplicateOutcome::Pending(pending) = manager.handle(DuplicateCommand::LoadPending)? else {
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&pending)?);
        return Ok(());
    }
    if pending.is_empty() {
        println!("No pending duplicates");
        return Ok(());
    }

    let names: HashMap<ContactId, String> = manager
        .contacts()
        .list()?
        .into_iter()
        .map(|c| (c.id.clone(), c.display_name()))
        .collect();
    let name_of = |id: &ContactId| names.get(id).cloned().unwrap_or_else(|| id.to_string());

    for suggestion in &pending {
        let reasons: Vec<String> = suggestion
            .match_reasons
            .iter()
            .map(|r| format!("{} {}", r.icon(), r.label()))
            .collect();
        println!(
            "[{:>6} {:>3}] {}",
            suggestion.severity().as_str(),
            suggestion.score,
            suggestion.id
        );
        println!(
            "    {} ({}) <-> {} ({})",
            name_of(&suggestion.contact1_id),
            suggestion.contact1_id,
            name_of(&suggestion.contact2_id),
            suggestion.contact2_id
        );
        println!("    {}", reasons.join(", "));
    }
    println!();
    println!("{} pending suggestion(s)", pending.len());
    Ok(())
}

/// Merge command.
fn cmd_merge(
    manager: &DuplicateManager,
    suggestion_id: String,
    primary: Option<String>,
) -> Result<()> {
    let outcome = manager.handle(DuplicateCommand::Merge {
        suggestion_id: SuggestionId::new(suggestion_id),
        primary_id: primary.map(ContactId::new),
    })?;
    if let DuplicateOutcome::Merged { contact, .. } = outcome {
        println!("Merged into {} ({})", contact.display_name(), contact.id);
        println!(
            "  {} phone(s), {} email(s)",
            contact.phones.len(),
            contact.emails.len()
        );
    }
    Ok(())
}

/// Dismiss command.
fn cmd_dismiss(manager: &DuplicateManager, suggestion_id: String) -> Result<()> {
    let outcome = manager.handle(DuplicateCommand::Dismiss {
        suggestion_id: SuggestionId::new(suggestion_id),
    })?;
    if let DuplicateOutcome::Dismissed {
        suggestion_id,
        changed,
    } = outcome
    {
        if changed {
            println!("Dismissed {suggestion_id}");
        } else {
            println!("{suggestion_id} was already resolved");
        }
    }
    Ok(())
}

/// Config command.
fn cmd_config(config: &AppConfig, show: bool) {
    if !show {
        println!("Use --show to display configuration");
        return;
    }

    let scoring = &config.scoring;
    println!("Current Configuration");
    println!("=====================");
    println!();
    println!("Data Directory: {}", config.data_dir.display());
    println!("Database: {}", config.database_path().display());
    println!();
    println!("Scoring:");
    println!("  Min Score: {}", scoring.min_score);
    println!("  Name (exact): {}", scoring.name_exact_weight);
    println!(
        "  Name (similar): {} at >= {}",
        scoring.name_similar_weight, scoring.name_similarity_threshold
    );
    println!("  Phone: {}", scoring.phone_weight);
    println!("  Email: {}", scoring.email_weight);
    println!("  Organization: {}", scoring.organization_weight);
    println!("  Birthday: {}", scoring.birthday_weight);
    println!("  Min Phone Digits: {}", scoring.min_phone_digits);
    println!();
    println!("Dismissal:");
    println!(
        "  Resurface On Change: {}",
        config.dismissal.resurface_on_change
    );
    println!();
    println!("Logging:");
    println!(
        "  Level: {}",
        config.logging.level.as_deref().unwrap_or("(default)")
    );
    println!("  Format: {:?}", config.logging.format);
    println!(
        "  File: {}",
        config
            .logging
            .file
            .as_ref()
            .map_or_else(|| "(stderr)".to_string(), |p| p.display().to_string())
    );
}
