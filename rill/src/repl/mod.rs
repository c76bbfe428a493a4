//! Interactive line executor
//!
//! Each entered line is decoded and executed as a one-line scratch program
//! against a persistent machine, so variables and `req`-loaded programs
//! survive between lines. Faults are reported without exiting.

use crate::engine::Machine;
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RlResult};
use std::path::PathBuf;

const PROMPT: &str = "rill> ";
const SCRATCH: &str = "<repl>";

/// REPL state
pub struct Repl {
    editor: DefaultEditor,
    machine: Machine,
}

impl Repl {
    pub fn new(base_dir: PathBuf) -> RlResult<Self> {
        Ok(Repl {
            editor: DefaultEditor::new()?,
            machine: Machine::new(base_dir),
        })
    }

    /// Run the read-eval loop until :quit or end of input
    pub fn run(&mut self) -> RlResult<()> {
        println!("rill repl");
        println!("Type :help for help, :quit to exit.\n");

        loop {
            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim_end();
                    if line.trim().is_empty() {
                        continue;
                    }
                    let _ = self.editor.add_history_entry(line);

                    if line.starts_with(':') {
                        if self.handle_command(line.trim()) {
                            break;
                        }
                        continue;
                    }

                    self.eval_line(line);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("Goodbye!");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {err}");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle REPL commands (starting with :)
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            ":quit" | ":q" | ":exit" => {
                println!("Goodbye!");
                true
            }
            ":help" | ":h" | ":?" => {
                self.print_help();
                false
            }
            ":vars" => {
                let mut bindings: Vec<_> = self
                    .machine
                    .store()
                    .iter()
                    .map(|(name, value)| (name.clone(), value.render()))
                    .collect();
                bindings.sort();
                for (name, text) in bindings {
                    println!("  [{name}] = {text}");
                }
                false
            }
            _ => {
                println!("Unknown command: {cmd}");
                println!("Type :help for help.");
                false
            }
        }
    }

    fn print_help(&self) {
        println!("rill repl commands:");
        println!("  :help, :h, :?   Show this help");
        println!("  :vars           List variables");
        println!("  :quit, :q       Exit the repl");
        println!();
        println!("Enter one instruction per line, e.g.:");
        println!("  var [x] 5");
        println!("  add [x] [x] 1");
        println!("  prt \"x is \" [x]");
        println!("  req \"lib\"      Load lib.rill from the program directory");
        println!("  cal start       Call a label defined in a loaded program");
    }

    /// Decode and execute one entered line
    fn eval_line(&mut self, line: &str) {
        if let Err(fault) = self.machine.load_source(SCRATCH, line) {
            eprintln!("{}", fault.source);
            return;
        }
        if let Err(fault) = self.machine.run(SCRATCH, 0) {
            eprintln!("{fault}");
        }
    }
}
