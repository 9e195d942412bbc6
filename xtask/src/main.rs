//! Build automation for the mongo-driver-pool workspace.
//!
//! Run with `cargo xtask <command>`.
//!
//! Tests are split into suites so the fast ones can run anywhere:
//!
//! - `unit`: `#[cfg(test)]` modules of the pool crate
//! - `mock`: behaviour, property and TCP tests against the in-process mocks
//! - `container`: tests against a MongoDB container (needs Docker)
//! - `live`: tests against `MONGO_HOST`/`MONGO_PORT`

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, ensure};
use clap::{Parser, Subcommand, ValueEnum};
use xshell::{Shell, cmd};

const POOL_CRATE: &str = "mongo-driver-pool";
const TESTING_CRATE: &str = "mongo-testing";

#[derive(Parser)]
#[command(name = "xtask", about = "Build automation for mongo-driver-pool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Format check, clippy, unit and mock suites, docs
    Ci,
    /// Check formatting, or apply it with --fix
    Fmt {
        #[arg(long)]
        fix: bool,
    },
    /// Clippy on every target with warnings denied
    Clippy,
    /// Run one or more test suites (unit and mock by default)
    Test {
        #[arg(short, long, value_enum)]
        suite: Vec<Suite>,
    },
    /// Repeat the multi-threaded pool tests to shake out races
    Stress {
        #[arg(short, long, default_value_t = 25)]
        rounds: u32,
    },
    /// Build rustdoc with warnings denied
    Doc {
        #[arg(long)]
        open: bool,
    },
    /// Coverage of the unit and mock suites (requires cargo-llvm-cov)
    Coverage {
        #[arg(long, value_enum, default_value_t = CoverageFormat::Html)]
        format: CoverageFormat,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Suite {
    Unit,
    Mock,
    Container,
    Live,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CoverageFormat {
    Html,
    Lcov,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;
    sh.change_dir(workspace_root()?);

    match cli.command {
        Command::Ci => {
            step("fmt", || fmt(&sh, false))?;
            step("clippy", || clippy(&sh))?;
            step("unit tests", || run_suite(&sh, Suite::Unit))?;
            step("mock tests", || run_suite(&sh, Suite::Mock))?;
            step("doc", || doc(&sh, false))?;
            println!("\nci passed");
        }
        Command::Fmt { fix } => fmt(&sh, fix)?,
        Command::Clippy => clippy(&sh)?,
        Command::Test { suite } => {
            let suites = if suite.is_empty() {
                vec![Suite::Unit, Suite::Mock]
            } else {
                suite
            };
            for suite in suites {
                step(&format!("{suite:?} suite").to_lowercase(), || run_suite(&sh, suite))?;
            }
        }
        Command::Stress { rounds } => stress(&sh, rounds)?,
        Command::Doc { open } => doc(&sh, open)?,
        Command::Coverage { format } => coverage(&sh, format)?,
    }

    Ok(())
}

/// Run `f`, reporting its name and wall time.
fn step(name: &str, f: impl FnOnce() -> Result<()>) -> Result<()> {
    println!("==> {name}");
    let started = Instant::now();
    f().with_context(|| format!("{name} failed"))?;
    println!("<== {name} ({:.1}s)", started.elapsed().as_secs_f64());
    Ok(())
}

fn workspace_root() -> Result<PathBuf> {
    let output = std::process::Command::new(env!("CARGO"))
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("cargo locate-project")?;
    let manifest = String::from_utf8(output.stdout).context("manifest path is not UTF-8")?;

    PathBuf::from(manifest.trim())
        .parent()
        .map(PathBuf::from)
        .context("manifest has no parent directory")
}

fn fmt(sh: &Shell, fix: bool) -> Result<()> {
    let check: &[&str] = if fix { &[] } else { &["--", "--check"] };
    cmd!(sh, "cargo fmt --all {check...}").run()?;
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;
    Ok(())
}

fn run_suite(sh: &Shell, suite: Suite) -> Result<()> {
    match suite {
        Suite::Unit => cmd!(sh, "cargo test -p {POOL_CRATE} --lib").run()?,
        Suite::Mock => cmd!(sh, "cargo test -p {TESTING_CRATE}").run()?,
        Suite::Container => cmd!(sh, "cargo test -p {TESTING_CRATE} --test container -- --ignored").run()?,
        Suite::Live => {
            ensure!(
                sh.var("MONGO_HOST").is_ok(),
                "MONGO_HOST must point at a MongoDB server for the live suite"
            );
            cmd!(sh, "cargo test -p {POOL_CRATE} --test integration -- --ignored").run()?;
        }
    }
    Ok(())
}

fn stress(sh: &Shell, rounds: u32) -> Result<()> {
    // Build once so every round only runs the binary
    cmd!(sh, "cargo test -p {TESTING_CRATE} --test pool_behaviour --no-run").run()?;
    for round in 1..=rounds {
        cmd!(sh, "cargo test -q -p {TESTING_CRATE} --test pool_behaviour -- concurrent racing")
            .run()
            .with_context(|| format!("round {round} of {rounds}"))?;
    }
    println!("{rounds} rounds passed");
    Ok(())
}

fn doc(sh: &Shell, open: bool) -> Result<()> {
    let open: &[&str] = if open { &["--open"] } else { &[] };
    let _flags = sh.push_env("RUSTDOCFLAGS", "-D warnings");
    cmd!(sh, "cargo doc --workspace --no-deps {open...}").run()?;
    Ok(())
}

fn coverage(sh: &Shell, format: CoverageFormat) -> Result<()> {
    let packages = ["-p", POOL_CRATE, "-p", TESTING_CRATE];
    match format {
        CoverageFormat::Html => {
            cmd!(sh, "cargo llvm-cov {packages...} --html").run()?;
            println!("report: target/llvm-cov/html/index.html");
        }
        CoverageFormat::Lcov => {
            cmd!(sh, "cargo llvm-cov {packages...} --lcov --output-path target/lcov.info").run()?;
            println!("report: target/lcov.info");
        }
    }
    Ok(())
}
