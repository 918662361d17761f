// Copyright (C) 2024 Ethan Uppal. All rights reserved.

use std::{path::PathBuf, process};

use clap::{Args, Parser, Subcommand, ValueEnum};
use stackvm::{
    arch::{Word, DEFAULT_POOL_SIZE},
    bytecode,
    memory::Memory,
    program, VMConfig, VMError, VM,
};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod image;

use image::ImageError;

/// Process status reported when the VM faults instead of exiting. Outside
/// the small statuses bytecode conventionally exits with.
const FAULT_STATUS: i32 = 125;

#[derive(Parser, Debug)]
#[command(name = "stackvm")]
#[command(about = "Runs and inspects stackvm bytecode images")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs an image until it executes EXIT
    Run {
        /// Whitespace-separated decimal words; `#` starts a comment
        file: PathBuf,
        /// Raw bytes copied to the start of the data arena before the run
        #[arg(long)]
        data: Option<PathBuf>,
        #[command(flatten)]
        machine: MachineArgs,
    },
    /// Prints the instruction listing of an image
    Disasm { file: PathBuf },
    /// Runs a built-in program that exits with 10 + 20
    Demo {
        #[command(flatten)]
        machine: MachineArgs,
    },
}

#[derive(Args, Debug)]
struct MachineArgs {
    /// Bytes in each of the instruction, data and stack arenas
    #[arg(long, env = "STACKVM_POOL_SIZE", default_value_t = DEFAULT_POOL_SIZE)]
    pool_size: usize,
    /// How bytecode addresses are resolved
    #[arg(long, value_enum, default_value_t = MemoryMode::Sandbox)]
    memory: MemoryMode,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum MemoryMode {
    /// Addresses stay inside the VM's own arenas
    Sandbox,
    /// Addresses are raw host pointers; bytecode is fully trusted
    Host,
}

#[derive(Debug, Error)]
enum RunError {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Machine(#[from] VMError),
    #[error("data image is {length} bytes but the data arena holds {capacity}")]
    DataTooLarge { length: usize, capacity: usize },
}

fn execute<M: Memory>(
    mut vm: VM<M>,
    program: &[Word],
    data: &[u8],
) -> Result<Word, RunError> {
    let arena = vm.data_mut();
    if data.len() > arena.len() {
        return Err(RunError::DataTooLarge {
            length: data.len(),
            capacity: arena.len(),
        });
    }
    arena[..data.len()].copy_from_slice(data);

    vm.load(program)?;
    Ok(vm.run()?)
}

fn run(
    machine: &MachineArgs,
    program: &[Word],
    data: &[u8],
) -> Result<Word, RunError> {
    let config = VMConfig::with_pool_size(machine.pool_size);
    info!(pool_size = machine.pool_size, memory = ?machine.memory, "starting");
    match machine.memory {
        MemoryMode::Sandbox => execute(VM::new(config)?, program, data),
        MemoryMode::Host => {
            // SAFETY: selecting host memory on the command line is the
            // user's statement that the image is trusted.
            let vm = unsafe { VM::with_host_memory(config) }?;
            execute(vm, program, data)
        }
    }
}

fn dispatch(command: Command) -> Result<Option<Word>, RunError> {
    match command {
        Command::Run {
            file,
            data,
            machine,
        } => {
            let program = image::load_words(&file)?;
            let data = match data {
                Some(path) => image::load_bytes(&path)?,
                None => vec![],
            };
            run(&machine, &program, &data).map(Some)
        }
        Command::Disasm { file } => {
            let words = image::load_words(&file)?;
            let listing = program::disassemble(&words).map_err(VMError::from)?;
            print!("{}", listing);
            Ok(None)
        }
        Command::Demo { machine } => {
            let program = bytecode![IMM(10), PUSH, IMM(20), ADD, PUSH, EXIT];
            run(&machine, &program, &[]).map(Some)
        }
    }
}

/// The process status for a finished run.
fn exit_status(outcome: &Result<Word, RunError>) -> i32 {
    match outcome {
        Ok(status) => *status as i32,
        Err(_) => FAULT_STATUS,
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stackvm=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let outcome = match dispatch(cli.command) {
        Ok(Some(status)) => Ok(status),
        Ok(None) => return,
        Err(error) => Err(error),
    };
    match &outcome {
        Ok(status) => println!("exit({})", status),
        Err(error) => error!(%error, "stackvm failed"),
    }
    process::exit(exit_status(&outcome));
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use stackvm::bytecode;

    use super::{
        dispatch, exit_status, run, Cli, Command, MachineArgs, MemoryMode,
        FAULT_STATUS,
    };

    fn sandbox() -> MachineArgs {
        MachineArgs {
            pool_size: 4096,
            memory: MemoryMode::Sandbox,
        }
    }

    #[test]
    fn demo_exits_with_thirty() {
        let cli = Cli::parse_from(["stackvm", "demo", "--pool-size", "4096"]);
        assert_eq!(Some(30), dispatch(cli.command).expect("demo should exit"));
    }

    #[test]
    fn demo_runs_on_host_memory() {
        let cli = Cli::parse_from([
            "stackvm", "demo", "--pool-size", "4096", "--memory", "host",
        ]);
        match &cli.command {
            Command::Demo { machine } => assert_eq!(MemoryMode::Host, machine.memory),
            other => panic!("expected demo, got {:?}", other),
        }
        assert_eq!(Some(30), dispatch(cli.command).expect("demo should exit"));
    }

    #[test]
    fn faults_map_to_a_reserved_status() {
        let outcome = run(&sandbox(), &[4242], &[]);
        assert!(outcome.is_err());
        assert_eq!(125, exit_status(&outcome));
        assert_eq!(FAULT_STATUS, exit_status(&outcome));
    }

    #[test]
    fn exit_words_become_the_status() {
        let program = bytecode![IMM(2), PUSH, EXIT];
        assert_eq!(2, exit_status(&run(&sandbox(), &program, &[])));
        assert_ne!(FAULT_STATUS, exit_status(&run(&sandbox(), &program, &[])));
    }

    #[test]
    fn undersized_pools_are_rejected() {
        let cli = Cli::parse_from(["stackvm", "demo", "--pool-size", "8"]);
        assert!(dispatch(cli.command).is_err());
    }
}
