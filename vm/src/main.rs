use clap::Parser as ClapParser;
use std::{
    fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    process,
};

use heap::HeapSettings;
use vm::{Vm, VmSettings, debug};

const EX_USAGE: i32 = 64;
const EX_DATAERR: i32 = 65;
const EX_IOERR: i32 = 74;

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Script to run; starts a REPL when omitted
    #[arg(required = false, help = "The script file to execute")]
    paths: Vec<PathBuf>,

    /// Print bytecode and constants instead of executing
    #[arg(long, help = "Dump bytecode of the script and its functions")]
    dump_bytecode: bool,

    /// Log every executed instruction at trace level
    #[arg(long, help = "Trace execution (implies RUST_LOG=trace)")]
    trace: bool,

    /// Collect before every allocation
    #[arg(long, help = "Run the collector on every allocation")]
    stress_gc: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => err.exit(),
        Err(err) => {
            let _ = err.print();
            eprintln!("Usage: vm [path]");
            process::exit(EX_USAGE);
        }
    };

    let default_filter = if cli.trace { "trace" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if cli.paths.len() > 1 {
        eprintln!("Usage: vm [path]");
        process::exit(EX_USAGE);
    }

    let settings = VmSettings {
        heap: HeapSettings {
            stress: cli.stress_gc,
            ..HeapSettings::default()
        },
        trace_execution: cli.trace,
        print_code: false,
    };
    let mut vm = Vm::new(settings);

    match cli.paths.first() {
        Some(path) if cli.dump_bytecode => dump_file(&mut vm, path),
        Some(path) => run_file(&mut vm, path),
        None => run_repl(&mut vm),
    }
}

fn read_source(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            log::debug!("reading {}: {err}", path.display());
            eprintln!("Could not open file \"{}\".", path.display());
            process::exit(EX_IOERR);
        }
    }
}

fn run_file(vm: &mut Vm, path: &Path) {
    let source = read_source(path);
    if let Err(err) = vm.interpret(&source) {
        process::exit(err.exit_code());
    }
}

fn dump_file(vm: &mut Vm, path: &Path) {
    let source = read_source(path);
    match vm.compile(&source) {
        Ok(function) => print!("{}", debug::disassemble(vm.heap(), function)),
        Err(err) => {
            eprintln!("{err}");
            process::exit(EX_DATAERR);
        }
    }
}

fn run_repl(vm: &mut Vm) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut input_buffer = String::new();

    loop {
        print!("> ");
        if let Err(err) = stdout.flush() {
            eprintln!("Error flushing stdout: {err}");
            break;
        }

        input_buffer.clear();
        match stdin.lock().read_line(&mut input_buffer) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {
                // Already reported to stderr; the session stays usable.
                if let Err(err) = vm.interpret(&input_buffer) {
                    log::debug!("repl input failed (exit code {})", err.exit_code());
                }
            }
            Err(err) => {
                eprintln!("Error reading input: {err}");
                break;
            }
        }
    }
}
