//! Simulator host process.
//!
//! Usage:
//!   rhdl-sim <design.json> [--backend interpreter|bytecode|compiled]
//!   rhdl-sim <design.json> --run <ticks>
//!
//! Without `--run`, the process serves the newline-delimited JSON control
//! protocol on stdin/stdout for a UI host. Exit codes: 0 success, 1
//! elaboration error, 2 simulation error, 3 file I/O error.

mod protocol;

use std::io::{BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tracing::error;
use tracing_subscriber::EnvFilter;

use rhdl_bir::Design;
use rhdl_sim::{BackendKind, SimParams, Simulation};

use crate::protocol::{Event, Session};

const EXIT_ELABORATION: u8 = 1;
const EXIT_SIMULATION: u8 = 2;
const EXIT_IO: u8 = 3;

struct Args {
    design_path: String,
    backend: BackendKind,
    run: Option<u64>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut design_path = None;
    let mut backend = BackendKind::Bytecode;
    let mut run = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--backend" => {
                let value = args.next().context("--backend needs a value")?;
                backend = match value.as_str() {
                    "interpreter" => BackendKind::Interpreter,
                    "bytecode" => BackendKind::Bytecode,
                    "compiled" => BackendKind::Compiled,
                    other => anyhow::bail!("unknown backend `{other}`"),
                };
            }
            "--run" => {
                let value = args.next().context("--run needs a tick count")?;
                run = Some(value.parse().context("--run takes a number")?);
            }
            other if design_path.is_none() => design_path = Some(other.to_owned()),
            other => anyhow::bail!("unexpected argument `{other}`"),
        }
    }
    Ok(Args {
        design_path: design_path.context(
            "usage: rhdl-sim <design.json> [--backend interpreter|bytecode|compiled] [--run N]",
        )?,
        backend,
        run,
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(EXIT_IO);
        }
    };

    let text = match std::fs::read_to_string(&args.design_path) {
        Ok(text) => text,
        Err(io) => {
            error!(path = %args.design_path, %io, "cannot read design");
            return ExitCode::from(EXIT_IO);
        }
    };

    let design = match rhdl_bir::design_from_json(&text)
        .and_then(|(top, registry)| Design::elaborate(&top, &registry))
    {
        Ok(design) => Arc::new(design),
        Err(elab) => {
            eprintln!("elaboration failed: {elab}");
            return ExitCode::from(EXIT_ELABORATION);
        }
    };

    let sim = Simulation::new(design, args.backend, SimParams::default());

    match args.run {
        Some(ticks) => run_batch(sim, ticks),
        None => serve(sim),
    }
}

/// Non-interactive mode: run N ticks and print the output ports.
fn run_batch(mut sim: Simulation, ticks: u64) -> ExitCode {
    if let Err(sim_error) = sim.run_ticks(ticks) {
        eprintln!("simulation failed: {sim_error}");
        return ExitCode::from(EXIT_SIMULATION);
    }
    let outputs: Vec<_> = sim.design().outputs().to_vec();
    let mut report = std::collections::BTreeMap::new();
    for id in outputs {
        let name = sim.design().signals()[id.0].name.clone();
        match sim.peek_by_idx(id.0) {
            Ok(value) => {
                report.insert(name, value.value());
            }
            Err(sim_error) => {
                eprintln!("simulation failed: {sim_error}");
                return ExitCode::from(EXIT_SIMULATION);
            }
        }
    }
    match serde_json::to_string(&report) {
        Ok(text) => println!("{text}"),
        Err(io) => {
            eprintln!("cannot encode report: {io}");
            return ExitCode::from(EXIT_IO);
        }
    }
    ExitCode::SUCCESS
}

/// Interactive mode: serve the control protocol until `quit` or EOF.
fn serve(sim: Simulation) -> ExitCode {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut session = Session::new(sim);

    if emit(&stdout, &session.ready()).is_err() {
        return ExitCode::from(EXIT_IO);
    }
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(io) => {
                error!(%io, "stdin closed uncleanly");
                return ExitCode::from(EXIT_IO);
            }
        };
        for event in session.handle_line(&line) {
            if emit(&stdout, &event).is_err() {
                return ExitCode::from(EXIT_IO);
            }
        }
        if session.is_done() {
            break;
        }
    }
    ExitCode::SUCCESS
}

fn emit(stdout: &std::io::Stdout, event: &Event) -> std::io::Result<()> {
    let mut handle = stdout.lock();
    serde_json::to_writer(&mut handle, event)?;
    handle.write_all(b"\n")?;
    handle.flush()
}
