use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Result, eyre};
use memberstore::{
    Config, FieldSet, FieldType, FieldValue, Filter, Payload, StorageKind, Store, StoreError, ViewCache, Violations,
    apply_filters, form_controls,
};
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser)]
#[command(name = "memberstore")]
#[command(about = "MemberStore CLI - Field-driven member records with validation and filters")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Config file (default: ./memberstore.yaml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Storage backend, overrides the config file
    #[arg(long, value_enum, global = true)]
    storage: Option<StorageKind>,

    /// Directory holding snapshots, overrides the config file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show records as a table
    List {
        /// Column filter as field=value; repeat a field to OR its values
        #[arg(short, long = "filter")]
        filters: Vec<String>,
    },

    /// Add a record
    Add {
        /// Field value as field=value
        #[arg(short, long = "set")]
        values: Vec<String>,
    },

    /// Change fields of an existing record
    Update {
        id: String,
        /// Field value as field=value
        #[arg(short, long = "set")]
        values: Vec<String>,
    },

    /// Delete one record
    Delete { id: String },

    /// Delete several records, ignoring ids that do not exist
    DeleteMany {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Show form controls and their rules
    Fields,

    /// Validate values without saving them
    Check {
        /// Field value as field=value
        #[arg(short, long = "set")]
        values: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(storage) = cli.storage {
        config.storage = storage;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let mut store = config.open_store()?;

    match cli.command {
        Commands::List { filters } => {
            let filters = filters.iter().map(|f| Filter::parse(f)).collect::<Result<Vec<_>>>()?;
            print_table(&store, &Filter::merge(filters));
        }
        Commands::Add { values } => {
            let mut candidate = store.fields().blank_payload();
            candidate.extend(parse_values(store.fields(), &values)?);
            let record = store.add(candidate).map_err(report)?;
            println!("Added {}", record.id.green());
        }
        Commands::Update { id, values } => {
            let patch = parse_values(store.fields(), &values)?;
            let record = store.update(&id, patch).map_err(report)?;
            println!("Updated {}", record.id.green());
        }
        Commands::Delete { id } => {
            store.delete(&id).map_err(report)?;
            println!("Deleted {}", id.green());
        }
        Commands::DeleteMany { ids } => {
            let removed = store.delete_many(&ids).map_err(report)?;
            println!("Deleted {} of {} records", removed, ids.len());
        }
        Commands::Fields => print_fields(store.fields()),
        Commands::Check { values } => {
            let candidate = parse_values(store.fields(), &values)?;
            match store.validate(&candidate) {
                Ok(()) => println!("{}", "Valid".green()),
                Err(violations) => {
                    print_violations(&violations);
                    return Err(eyre!("{} field(s) failed validation", violations.len()));
                }
            }
        }
    }

    if let Some(message) = store.persistence_error() {
        eprintln!("{} changes were not saved: {}", "warning:".yellow().bold(), message);
    }

    Ok(())
}

/// Parse `field=value` pairs, reading checkbox fields as booleans
fn parse_values(fields: &FieldSet, pairs: &[String]) -> Result<Payload> {
    let mut payload = Payload::new();
    for pair in pairs {
        let (field_id, raw) = pair
            .split_once('=')
            .ok_or_else(|| eyre!("Invalid value: {} (expected field=value)", pair))?;

        let is_checkbox = fields.get(field_id).is_some_and(|f| f.kind == FieldType::Checkbox);
        let value = match (is_checkbox, raw) {
            (true, "true") => FieldValue::Flag(true),
            (true, "false") => FieldValue::Flag(false),
            _ => FieldValue::from(raw),
        };
        payload.insert(field_id.to_string(), value);
    }
    Ok(payload)
}

fn report(err: StoreError) -> eyre::Report {
    if let Some(violations) = err.violations() {
        print_violations(violations);
    }
    eyre::Report::new(err)
}

fn print_violations(violations: &Violations) {
    for (field, messages) in violations {
        for message in messages {
            eprintln!("  {} {}", format!("{}:", field).red().bold(), message);
        }
    }
}

fn print_table(store: &Store, filters: &[Filter]) {
    let mut cache = ViewCache::new();
    let columns = cache.columns(store);
    let rows = apply_filters(columns, store.records(), filters);

    let header: Vec<String> = std::iter::once("id".to_string())
        .chain(columns.iter().map(|c| c.label.clone()))
        .collect();
    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|record| {
            std::iter::once(record.id.clone())
                .chain(columns.iter().map(|c| c.display(record)))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = (0..header.len())
        .map(|i| {
            body.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(header[i].chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ")
    };

    println!("{}", line(&header).bold());
    for row in &body {
        println!("{}", line(row));
    }
    println!("{} of {} records", rows.len(), store.len());
}

fn print_fields(fields: &FieldSet) {
    for control in form_controls(fields) {
        let marker = if control.required { "*".red().to_string() } else { " ".to_string() };
        let rules = control.rules.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ");
        println!(
            "{}{} {:<18} {:<12} {}",
            marker,
            format!("{:<20}", control.label).bold(),
            control.field_id,
            control.kind.name(),
            rules.dimmed()
        );
    }
}
