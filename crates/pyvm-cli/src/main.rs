//! `pyvm` - run, inspect and pack compiled Python 3 programs.

use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    rc::Rc,
};

use clap::{Parser, Subcommand};
use pyvm::{
    load_file, load_pyc, Code, Interpreter, LoadError, LoaderConfig, OperandEncoding, Outcome, Session, StdPrint,
    VmConfig,
};
use tracing::{debug, error};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pyvm", version)]
#[command(about = "A stack VM for Python 3 code objects")]
struct Cli {
    /// Trace every instruction and frame (sets the log level to debug)
    #[arg(long, global = true)]
    debug: bool,

    /// Read operands as two independent bytes instead of one 16-bit value
    #[arg(long, global = true)]
    split_operands: bool,

    /// Accept .pyc files with this magic number in addition to the defaults
    #[arg(long = "magic", global = true, value_name = "N")]
    magics: Vec<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one program; any exception ends the process with a failure status
    Run { file: PathBuf },
    /// Evaluate several programs in one shared session, reporting exceptions and continuing
    Session {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the disassembly of a program and its nested code objects
    Dis { file: PathBuf },
    /// Convert a .pyc file into a packed code snapshot
    Pack {
        file: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Initialize logging; `RUST_LOG` overrides the default filter.
fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let encoding = if cli.split_operands {
        OperandEncoding::SplitBytes
    } else {
        OperandEncoding::Wide
    };
    let config = VmConfig::new().trace(cli.debug).encoding(encoding);
    let loader = cli.magics.iter().fold(LoaderConfig::new(), |l, m| l.with_magic(*m));

    match cli.command {
        Command::Run { file } => run(&file, config, &loader),
        Command::Session { files } => session(&files, config, &loader),
        Command::Dis { file } => match load_file(&file, &loader) {
            Ok(code) => {
                print!("{}", code.disassemble(encoding));
                ExitCode::SUCCESS
            }
            Err(err) => load_failed(&file, &err),
        },
        Command::Pack { file, output } => pack(&file, &output, &loader),
    }
}

fn run(file: &Path, config: VmConfig, loader: &LoaderConfig) -> ExitCode {
    let code = match load_file(file, loader) {
        Ok(code) => code,
        Err(err) => return load_failed(file, &err),
    };
    let mut interpreter = Interpreter::new(config, StdPrint);
    match interpreter.exec_code(code, None) {
        Ok(value) => {
            debug!(result = %value.py_repr(), "program finished");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn session(files: &[PathBuf], config: VmConfig, loader: &LoaderConfig) -> ExitCode {
    let mut session = Session::new(config, StdPrint);
    let mut status = ExitCode::SUCCESS;
    for file in files {
        let code = match load_file(file, loader) {
            Ok(code) => code,
            Err(err) => {
                status = load_failed(file, &err);
                continue;
            }
        };
        match session.eval(code) {
            Ok(Outcome::Value(_)) => {}
            Ok(Outcome::Fault(exc)) => eprintln!("{}: {exc}", file.display()),
            Err(err) => {
                error!(file = %file.display(), "fatal: {err}");
                eprintln!("{}: {err}", file.display());
                return ExitCode::FAILURE;
            }
        }
    }
    status
}

fn pack(file: &Path, output: &Path, loader: &LoaderConfig) -> ExitCode {
    let packed = fs::read(file)
        .map_err(LoadError::from)
        .and_then(|bytes| load_pyc(&bytes, loader))
        .and_then(|program| snapshot(&program.code));
    match packed {
        Ok(bytes) => match fs::write(output, bytes) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("error: cannot write {}: {err}", output.display());
                ExitCode::FAILURE
            }
        },
        Err(err) => load_failed(file, &err),
    }
}

fn snapshot(code: &Rc<Code>) -> Result<Vec<u8>, LoadError> {
    Ok(code.dump()?)
}

fn load_failed(file: &Path, err: &LoadError) -> ExitCode {
    eprintln!("error: cannot load {}: {err}", file.display());
    ExitCode::FAILURE
}
