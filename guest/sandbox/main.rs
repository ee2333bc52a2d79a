//! Sandbox guest - the isolated side of the process backend
//!
//! Reads `run` envelopes from stdin, one per line, and answers each with a
//! `result` envelope on stdout. Logs go to stderr; stdout carries only
//! envelopes.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pipeagent::sandbox::guest::{serve_stdio, GuestLimits, GUEST_STACK_SIZE};

#[derive(Debug, Parser)]
#[command(name = "sandbox_guest", version, about = "Isolated JavaScript runner for pipeagent")]
struct Args {
    /// Iterations allowed per loop before a script is aborted
    #[arg(long, default_value_t = GuestLimits::default().loop_iteration_limit)]
    loop_iteration_limit: u64,

    /// Maximum call depth
    #[arg(long, default_value_t = GuestLimits::default().recursion_limit)]
    recursion_limit: usize,
}

fn main() -> std::io::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let limits = GuestLimits {
        loop_iteration_limit: args.loop_iteration_limit,
        recursion_limit: args.recursion_limit,
    };
    tracing::debug!(?limits, "Sandbox guest ready");

    // The interpreter runs off the main thread so it gets a larger stack
    let server = std::thread::Builder::new()
        .name("sandbox-guest".to_string())
        .stack_size(GUEST_STACK_SIZE)
        .spawn(move || serve_stdio(limits))?;

    match server.join() {
        Ok(served) => served,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "sandbox guest thread panicked",
        )),
    }
}
