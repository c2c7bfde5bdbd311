use rustyline::{error::ReadlineError, DefaultEditor};

use crate::{
    config::InterpreterConfig,
    diagnostics::{CorvidError, Result},
    runtime::Interpreter,
};

pub struct Repl {
    interpreter: Interpreter,
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}

impl Repl {
    pub fn new() -> Self {
        Self::with_config(InterpreterConfig::default())
    }

    pub fn with_config(config: InterpreterConfig) -> Self {
        Self {
            interpreter: Interpreter::with_config(config),
        }
    }

    /// Reads lines until `:quit`, EOF or Ctrl-C. Definitions persist between
    /// lines; errors are reported and the session continues.
    pub fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new().map_err(readline_error)?;
        loop {
            match editor.readline("corvid> ") {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed == ":quit" || trimmed == ":exit" {
                        break;
                    }
                    if trimmed.is_empty() {
                        continue;
                    }
                    editor.add_history_entry(trimmed).ok();
                    match self.interpreter.eval_source(trimmed) {
                        Ok(value) if value.is_null() => {}
                        Ok(value) => match self.interpreter.stringify(&value) {
                            Ok(text) => println!("{text}"),
                            Err(err) => eprintln!("error: {err}"),
                        },
                        Err(CorvidError::Diagnostic(diag)) => {
                            eprintln!("{}: {}", diag.kind, diag.message);
                        }
                        Err(other) => eprintln!("error: {other}"),
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(readline_error(err)),
            }
        }
        Ok(())
    }
}

fn readline_error(err: ReadlineError) -> CorvidError {
    CorvidError::from(std::io::Error::other(err))
}
