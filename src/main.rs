// Prospect Unification CLI
//
//   unify company add ACME1 "Acme Heating"
//   unify import --company ACME1 mm_spring.csv
//   unify batch create --company ACME1 --number 1 --year 2024 --week 12
//   unify export --company ACME1 --rule include_prospects_only --job J100 --ring-to 5555550100
//   unify rules

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use prospect_unification::logging::init_logging;
use prospect_unification::{
    write_csv, CompanyDirectory, EntityTarget, ExportRequest, Exporter, FilterRequest,
    ImportOptions, Importer, RuleRegistry, Selection, SourceFormat, SqliteStore, UnifyConfig,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "unify")]
#[command(version, about = "Prospect/customer unification and campaign export", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "unify.toml", env = "UNIFY_CONFIG")]
    config: PathBuf,

    /// SQLite database (overrides config)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage companies
    #[command(subcommand)]
    Company(CompanyCommand),

    /// Import a legacy export file
    Import(ImportArgs),

    /// Manage campaign batches
    #[command(subcommand)]
    Batch(BatchCommand),

    /// Write a campaign export as CSV
    Export(ExportArgs),

    /// List the registered filter rules
    Rules,
}

#[derive(Subcommand, Debug)]
enum CompanyCommand {
    /// Register a company
    Add { identifier: String, name: String },

    /// List registered companies
    List,
}

#[derive(Subcommand, Debug)]
enum BatchCommand {
    /// Create an empty batch
    Create {
        #[arg(long)]
        company: String,
        #[arg(long)]
        number: i64,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        week: u32,
    },

    /// Assign prospects (by external id) to a batch
    Assign {
        #[arg(long)]
        batch: i64,
        #[arg(required = true)]
        prospects: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Company identifier the rows belong to
    #[arg(long)]
    company: String,

    /// Source format (detected from file name and headers when omitted)
    #[arg(long)]
    format: Option<SourceFormat>,

    /// Run a single parser target
    #[arg(long)]
    target: Option<EntityTarget>,

    /// Store rows with empty identity fields instead of skipping them
    #[arg(long)]
    keep_invalid: bool,

    file: PathBuf,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[arg(long)]
    company: String,

    /// Inclusion rule name (see `unify rules`)
    #[arg(long)]
    rule: String,

    #[arg(long)]
    job: String,

    #[arg(long)]
    ring_to: String,

    /// Export a single batch
    #[arg(long, conflicts_with = "weeks")]
    batch: Option<i64>,

    /// Year for --weeks
    #[arg(long, requires = "weeks")]
    year: Option<i32>,

    /// Calendar weeks, comma separated
    #[arg(long, value_delimiter = ',', requires = "year")]
    weeks: Vec<u32>,

    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    postal_codes: Vec<String>,

    #[arg(long)]
    club_members: Option<String>,

    #[arg(long)]
    installations: Option<String>,

    #[arg(long)]
    address_type: Option<String>,

    #[arg(long)]
    min_ltv: Option<f64>,

    #[arg(long)]
    max_ltv: Option<f64>,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl ExportArgs {
    fn selection(&self) -> Selection {
        match (self.batch, self.year) {
            (Some(batch), _) => Selection::Batch(batch),
            (None, Some(year)) => Selection::Weeks {
                year,
                weeks: self.weeks.clone(),
            },
            (None, None) => Selection::Company,
        }
    }

    fn filter(&self) -> FilterRequest {
        let mut filter = FilterRequest::new(&self.company, &self.rule)
            .with_tags(self.tags.clone())
            .with_postal_codes(self.postal_codes.clone())
            .with_ltv_bounds(self.min_ltv, self.max_ltv);

        if let Some(rule) = &self.club_members {
            filter = filter.with_club_members_rule(rule);
        }
        if let Some(rule) = &self.installations {
            filter = filter.with_installations_rule(rule);
        }
        if let Some(rule) = &self.address_type {
            filter = filter.with_address_type_rule(rule);
        }
        filter
    }
}

/// File and environment first, then command line flags, validated last
fn resolve_config(cli: &Cli) -> Result<UnifyConfig> {
    let mut config = UnifyConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(database) = &cli.database {
        config.database.path = database.clone();
    }
    config.validate().context("Invalid command line override")?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    init_logging(&config.logging).context("Failed to initialize logging")?;

    match &cli.command {
        Commands::Rules => run_rules(),
        command => {
            let store = SqliteStore::open(&config.database.path)
                .with_context(|| format!("Failed to open database {}", config.database.path.display()))?
                .with_page_size(config.export.page_size);

            match command {
                Commands::Company(cmd) => run_company(&store, cmd),
                Commands::Import(args) => run_import(&store, &config, args),
                Commands::Batch(cmd) => run_batch(&store, cmd),
                Commands::Export(args) => run_export(&store, args),
                Commands::Rules => run_rules(),
            }
        }
    }
}

fn run_company(store: &SqliteStore, cmd: &CompanyCommand) -> Result<()> {
    match cmd {
        CompanyCommand::Add { identifier, name } => {
            let company = store.add_company(identifier, name)?;
            println!("✓ Company {} ({}) id={}", company.identifier, company.name, company.id);
        }
        CompanyCommand::List => {
            for company in store.companies()? {
                println!("{:>4}  {:<12} {}", company.id, company.identifier, company.name);
            }
        }
    }
    Ok(())
}

fn run_import(store: &SqliteStore, config: &UnifyConfig, args: &ImportArgs) -> Result<()> {
    let mut options = ImportOptions::default()
        .with_parse_options(config.import.parse_options())
        .with_progress_interval(config.import.progress_interval)
        .with_skip_invalid(config.import.skip_invalid && !args.keep_invalid);
    if let Some(format) = args.format {
        options = options.with_format(format);
    }
    if let Some(target) = args.target {
        options = options.with_target(target);
    }

    let summary = Importer::new(store, store, options)
        .import_file(&args.company, &args.file)
        .with_context(|| format!("Failed to import {}", args.file.display()))?;

    println!("✓ Run {}", summary.run_id);
    println!("  Format:          {}", summary.format);
    println!("  Rows read:       {}", summary.rows_read);
    println!("  Re-encoded rows: {}", summary.reencoded_rows);
    println!("  Records:         {}", summary.produced);
    println!("  Inserted:        {}", summary.inserted);
    println!("  Updated:         {}", summary.updated);
    println!("  Skipped invalid: {}", summary.skipped_invalid);
    println!("  Flagged:         {}", summary.flagged);
    println!("  Elapsed:         {:.2?}", summary.elapsed);
    Ok(())
}

fn run_batch(store: &SqliteStore, cmd: &BatchCommand) -> Result<()> {
    match cmd {
        BatchCommand::Create {
            company,
            number,
            year,
            week,
        } => {
            let company = store.require(company)?;
            let batch = store.create_batch(&company, *number, *year, *week)?;
            println!("✓ Batch id={} number={} {}-W{}", batch.id, batch.number, batch.year, batch.week);
        }
        BatchCommand::Assign { batch, prospects } => {
            let ids: Vec<&str> = prospects.iter().map(String::as_str).collect();
            let assigned = store.assign_batch(*batch, &ids)?;
            println!("✓ Assigned {} prospects to batch {}", assigned, batch);
        }
    }
    Ok(())
}

fn run_export(store: &SqliteStore, args: &ExportArgs) -> Result<()> {
    let registry = RuleRegistry::standard();
    let request = ExportRequest::new(&args.job, &args.ring_to, args.filter());

    let rows = Exporter::new(store, store, &registry)
        .export(&request, args.selection())
        .context("Failed to start export")?;

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    let written = write_csv(rows, writer).context("Export failed")?;
    if let Some(path) = &args.output {
        eprintln!("✓ Wrote {} data rows to {}", written.saturating_sub(1), path.display());
    }
    Ok(())
}

fn run_rules() -> Result<()> {
    let registry = RuleRegistry::standard();
    for rule in registry.rules() {
        println!(
            "{:<34} {:<34} {}",
            rule.group.as_str(),
            rule.name,
            rule.displayed_name
        );
    }
    Ok(())
}
