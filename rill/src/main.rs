//! rill CLI

use clap::{Parser, Subcommand};
use rill::engine::{Machine, PROGRAM_EXT};
use rill::error::{report_fault, Fault, RunError};
use rill::util::find_similar_name;
use std::path::PathBuf;
use std::time::Instant;

/// Edit distance within which a name counts as a likely typo
const SUGGESTION_THRESHOLD: usize = 2;

const DEFAULT_DIR: &str = "programs";
const ENTRY_PROGRAM: &str = "main";
const SEED_SOURCE: &str = "prt \"Hello World!\"\n";

#[derive(Parser)]
#[command(name = "rill", version, about = "rill - line-oriented scripting language")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a program (defaults to programs/main.rill, seeded on first run)
    Run {
        /// Program file to run
        file: Option<PathBuf>,
    },
    /// Decode a program and dump its instructions (debug)
    Decode {
        /// Program file to decode
        file: PathBuf,
    },
    /// Interactive prompt
    Repl,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { file } => run_program(file),
        Command::Decode { file } => decode_file(&file),
        Command::Repl => repl(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Split a program path into its directory and bare file stem
fn split_program_path(path: &PathBuf) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| ENTRY_PROGRAM.to_owned());
    (dir, stem)
}

fn run_program(file: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let (dir, entry) = match file {
        Some(path) => split_program_path(&path),
        None => {
            let dir = PathBuf::from(DEFAULT_DIR);
            if !dir.exists() {
                std::fs::create_dir_all(&dir)?;
                std::fs::write(
                    dir.join(format!("{ENTRY_PROGRAM}{PROGRAM_EXT}")),
                    SEED_SOURCE,
                )?;
            }
            (dir, ENTRY_PROGRAM.to_owned())
        }
    };

    let mut machine = Machine::new(dir);
    let started = Instant::now();

    let failed = match machine.load_file(&entry) {
        Err(e) => {
            eprintln!("Error: {e}");
            true
        }
        Ok(()) => match machine.run(&entry, 0) {
            Ok(()) => false,
            Err(fault) => {
                let hint = suggestion_hint(&machine, &fault);
                match machine.program(&fault.file) {
                    Some(unit) => {
                        report_fault(&fault.file, &unit.source, &fault, hint.as_deref())
                    }
                    None => eprintln!("{fault}"),
                }
                true
            }
        },
    };

    println!("Program ended");
    println!("Ran for {:?}", started.elapsed());
    if failed {
        std::process::exit(1);
    }
    Ok(())
}

/// "Did you mean" hint for misspelled labels and variables
fn suggestion_hint(machine: &Machine, fault: &Fault) -> Option<String> {
    match &fault.source {
        RunError::UndefinedLabel { name } => {
            find_similar_name(name, machine.label_names(), SUGGESTION_THRESHOLD)
                .map(|s| format!("did you mean `{s}`?"))
        }
        RunError::UndefinedVariable { name } => {
            find_similar_name(name, machine.store().names(), SUGGESTION_THRESHOLD)
                .map(|s| format!("did you mean `[{s}]`?"))
        }
        _ => None,
    }
}

fn decode_file(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let (dir, stem) = split_program_path(path);
    let mut machine = Machine::new(dir);
    machine.load_file(&stem)?;
    let unit = machine
        .program(&stem)
        .ok_or("program not registered after load")?;
    println!("{}", serde_json::to_string_pretty(&unit.instructions)?);
    Ok(())
}

fn repl() -> Result<(), Box<dyn std::error::Error>> {
    let mut repl = rill::repl::Repl::new(PathBuf::from(DEFAULT_DIR))?;
    repl.run()?;
    Ok(())
}
