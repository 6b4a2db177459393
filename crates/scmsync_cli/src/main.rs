//! Command line entry point for ownership snapshot imports.
//!
//! # Usage
//!
//! ```bash
//! scmsync check --domains domains.txt --trees git-trees.txt
//! scmsync import --db scm.sqlite3 --domains domains.txt --trees git-trees.txt
//! scmsync licenses --db scm.sqlite3 MIT Apache-2.0
//! scmsync packages --db scm.sqlite3 --file packages.txt --json
//! ```

use clap::{Parser, Subcommand};
use log::{error, info};
use scmsync_core::{
    check_scm, default_log_level, init_logging, open_db, parse_package_links, ImportConfig,
    ImportError, ImportReport, LicenseRepository, LinkOutcome, ScmService,
    SqliteLicenseRepository,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "scmsync")]
#[command(version)]
#[command(about = "Validate and import source-control ownership snapshots")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Emit reports as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Absolute directory for rotating log files; logging is off without it
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate domain and tree files without touching a database
    Check {
        #[arg(long)]
        domains: PathBuf,
        #[arg(long)]
        trees: PathBuf,
    },

    /// Validate, then import a snapshot into the database
    Import {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        domains: PathBuf,
        #[arg(long)]
        trees: PathBuf,
    },

    /// Register license short names
    Licenses {
        #[arg(long)]
        db: PathBuf,
        /// Short names to register; lists licenses when empty
        names: Vec<String>,
    },

    /// Link packages to trees from a `<package> <gitpath>` list
    Packages {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        file: PathBuf,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Check { .. } => "check",
            Self::Import { .. } => "import",
            Self::Licenses { .. } => "licenses",
            Self::Packages { .. } => "packages",
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        if let Err(err) = init_logging(level, log_dir) {
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
    }

    let command = cli.command.name();
    info!("event=cli_command module=cli status=start command={command}");
    let result = match cli.command {
        Commands::Check { domains, trees } => cmd_check(&domains, &trees, cli.json),
        Commands::Import { db, domains, trees } => cmd_import(&db, &domains, &trees, cli.json),
        Commands::Licenses { db, names } => cmd_licenses(&db, &names, cli.json),
        Commands::Packages { db, file } => cmd_packages(&db, &file, cli.json),
    };

    match result {
        Ok(code) => code,
        Err(message) => {
            error!("event=cli_command module=cli status=error command={command}");
            eprintln!("error: {message}");
            ExitCode::from(2)
        }
    }
}

fn read(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|err| format!("cannot read `{}`: {err}", path.display()))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|err| err.to_string())
}

fn cmd_check(domains: &Path, trees: &Path, json: bool) -> Result<ExitCode, String> {
    let report = check_scm(&read(domains)?, &read(trees)?, &ImportConfig::default());
    if json {
        println!("{}", to_json(&report)?);
    } else {
        println!("{report}");
    }
    Ok(if report.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_import(db: &Path, domains: &Path, trees: &Path, json: bool) -> Result<ExitCode, String> {
    let domain_text = read(domains)?;
    let tree_text = read(trees)?;
    let mut conn = open_db(db).map_err(|err| err.to_string())?;
    let mut service = ScmService::new(&mut conn);

    match service.import(&domain_text, &tree_text) {
        Ok(report) => {
            print_import(&report, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(ImportError::Validation(report)) => {
            if json {
                println!("{}", to_json(&report)?);
            } else {
                println!("{report}");
            }
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err.to_string()),
    }
}

fn cmd_licenses(db: &Path, names: &[String], json: bool) -> Result<ExitCode, String> {
    let conn = open_db(db).map_err(|err| err.to_string())?;
    let repo = SqliteLicenseRepository::new(&conn);
    for name in names {
        repo.register_license(name).map_err(|err| err.to_string())?;
    }
    let licenses = repo.list_licenses().map_err(|err| err.to_string())?;
    if json {
        println!("{}", to_json(&licenses)?);
    } else {
        licenses.iter().for_each(|license| println!("{license}"));
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_packages(db: &Path, file: &Path, json: bool) -> Result<ExitCode, String> {
    let links = parse_package_links(&read(file)?)
        .map_err(|err| format!("{}: {err}", file.display()))?;
    let mut conn = open_db(db).map_err(|err| err.to_string())?;
    let report = ScmService::new(&mut conn)
        .import_packages(&links)
        .map_err(|err| err.to_string())?;
    print_import(&report, json)?;
    Ok(ExitCode::SUCCESS)
}

fn print_import(report: &ImportReport, json: bool) -> Result<(), String> {
    if json {
        println!("{}", to_json(report)?);
        return Ok(());
    }

    println!("run {}", report.run_id);
    for (entity, stats) in &report.entities {
        println!(
            "{entity:>15}: created={:<5} updated={:<5} deleted={:<5}",
            stats.created, stats.updated, stats.deleted
        );
    }
    for sync in &report.links {
        println!(
            "{:>15}: added={:<5} removed={:<5} retained={:<5} skipped={:<5}",
            format!("{}-{}", sync.left, sync.right),
            sync.stats.added,
            sync.stats.removed,
            sync.stats.retained,
            sync.stats.skipped
        );
        for record in sync.skipped() {
            if let LinkOutcome::SkippedUnresolved(reason) = &record.outcome {
                println!("{:>15}  skipped {} -> {}: {reason}", "", record.left, record.right);
            }
        }
    }
    if report.is_noop() {
        println!("no changes");
    }
    Ok(())
}
