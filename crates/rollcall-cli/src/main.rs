use anyhow::Result;
use clap::{Parser, Subcommand};
use rollcall_core::types::DATE_FORMAT;
use rollcall_core::{
    Action, AttendanceEvent, Config, CsvLedger, DirectoryError, IdentityDirectory, Registration,
    Summary,
};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance records and identity directory")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the attendance report and regenerate the summary file
    Summary {
        /// Number of most recent events to show
        #[arg(short, long)]
        recent: Option<usize>,
    },
    /// Register a numeric id for a person
    Register {
        /// Numeric id used by the recognizer (e.g., 1, 2, 3)
        id: String,
        /// Display name written to the attendance log
        name: String,
    },
    /// Look up the name registered for an id
    Resolve {
        id: String,
    },
    /// Remove an id from the directory (past attendance is kept)
    Unregister {
        id: String,
    },
    /// List registered identities
    List,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Summary { recent } => {
            let ledger = CsvLedger::new(&config.ledger_path, &config.summary_path);
            let today = chrono::Local::now().date_naive();
            match ledger.summarize(recent.unwrap_or(config.recent_limit), today)? {
                Some(summary) => {
                    print_summary(&summary);
                    println!(
                        "\nSummary saved to '{}'",
                        ledger.summary_path().display()
                    );
                }
                None => println!("No attendance records found!"),
            }
        }
        Commands::Register { id, name } => {
            let mut directory = IdentityDirectory::load(&config.directory_path)?;
            match directory.register(&id, &name) {
                Ok(Registration::Added) => println!("Registered {id} -> {name}"),
                Ok(Registration::Unchanged) => println!("{id} is already registered as {name}"),
                Err(e @ DirectoryError::Conflict { .. }) => {
                    eprintln!("error: {e}");
                    eprintln!("Use a different numeric id or unregister {id} first.");
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Resolve { id } => {
            let directory = IdentityDirectory::load(&config.directory_path)?;
            match directory.resolve(&id) {
                Ok(name) => println!("{name}"),
                Err(DirectoryError::NotFound(_)) => {
                    println!("{}", rollcall_core::types::UNKNOWN_NAME);
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Unregister { id } => {
            let mut directory = IdentityDirectory::load(&config.directory_path)?;
            let name = directory.unregister(&id)?;
            println!("Removed '{name}' (id {id})");
            println!("Retrain the recognizer before the next run.");
        }
        Commands::List => {
            let directory = IdentityDirectory::load(&config.directory_path)?;
            if directory.is_empty() {
                println!("No identities registered");
            }
            for (id, name) in directory.iter() {
                println!("{id:>6}  {name}");
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_summary(summary: &Summary) {
    println!("=== ATTENDANCE REPORT ===");
    println!("Total records: {}", summary.total);
    if !summary.skipped.is_empty() {
        println!("Skipped malformed rows: {}", summary.skipped.len());
    }

    println!("\nRecent entries:");
    print_events(&summary.recent);

    println!("\n=== SUMMARY BY STUDENT ===");
    println!(
        "{:>6}  {:<20} {:>6} {:>6} {:>14}",
        "ID",
        "Name",
        Action::Entry.as_str(),
        Action::Exit.as_str(),
        Action::ExitForced.as_str()
    );
    for ((id, name), counts) in &summary.counts {
        println!(
            "{id:>6}  {name:<20} {:>6} {:>6} {:>14}",
            counts.entry, counts.exit, counts.exit_forced
        );
    }

    if !summary.today.is_empty() {
        println!(
            "\n=== TODAY'S ATTENDANCE ({}) ===",
            summary.date.format(DATE_FORMAT)
        );
        print_events(&summary.today);
    }
}

fn print_events(events: &[AttendanceEvent]) {
    for e in events {
        println!("{}", e.to_row().replace(',', "  "));
    }
}
