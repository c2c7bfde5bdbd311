use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use corvid::{config::DEFAULT_MAX_CALL_DEPTH, CorvidError, Interpreter, InterpreterConfig, Repl};

#[derive(Parser)]
#[command(author, version, about = "Corvid language interpreter")]
struct Args {
    /// Extra directory searched by `import` (repeatable)
    #[arg(short = 'I', long = "module-path", global = true)]
    module_paths: Vec<PathBuf>,
    /// Maximum nesting of script calls
    #[arg(long = "max-depth", global = true, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_depth: usize,
    /// Log filter used when CORVID_LOG is unset, e.g. `debug` or `corvid=trace`
    #[arg(long = "log-level", global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a Corvid script file
    Run { script: PathBuf },
    /// Start an interactive REPL session
    Repl,
    /// Evaluate a snippet of Corvid code and print its value
    Eval { source: String },
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let mut config = InterpreterConfig::new().with_max_call_depth(args.max_depth);
    for path in args.module_paths {
        config = config.with_module_path(path);
    }

    let result = match args.command.unwrap_or(Command::Repl) {
        Command::Run { script } => run_script(script, config),
        Command::Repl => Repl::with_config(config).run(),
        Command::Eval { source } => eval_snippet(&source, config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_env("CORVID_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_script(path: PathBuf, config: InterpreterConfig) -> Result<(), CorvidError> {
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut interpreter = Interpreter::with_config(config.with_module_name(name));
    interpreter.eval_file(&path)?;
    Ok(())
}

fn eval_snippet(source: &str, config: InterpreterConfig) -> Result<(), CorvidError> {
    let base_dir = std::env::current_dir()?;
    let mut interpreter = Interpreter::with_config(config.with_base_dir(base_dir));
    let value = interpreter.eval_source(source)?;
    if !value.is_null() {
        println!("{}", interpreter.stringify(&value)?);
    }
    Ok(())
}

fn report(err: &CorvidError) {
    match err {
        CorvidError::Diagnostic(diag) => {
            let line = diag
                .span
                .map(|span| format!(" at line {}", span.line))
                .unwrap_or_default();
            eprintln!("error[{}]{line}: {}", diag.kind, diag.message);
            for note in &diag.notes {
                eprintln!("  note: {note}");
            }
        }
        CorvidError::Thrown(thrown) => {
            let line = thrown
                .span
                .map(|span| format!(" at line {}", span.line))
                .unwrap_or_default();
            eprintln!("error[UserThrown]{line}: uncaught {}: {}", thrown.class_name, thrown.message);
        }
        CorvidError::Io(io) => eprintln!("error: {io}"),
    }
}
