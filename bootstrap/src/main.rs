//! PikeSquares bootstrap CLI entrypoint.
//!
//! Invoked by the launcher's bindings: `configure` resolves and records the
//! version to provision, `install` creates its virtual environment. Resolved
//! facts reach the launcher through the `SCIE_BINDING_ENV` hand-off file.

use clap::Parser;
use env_logger::{Builder, Env};
use log::LevelFilter;
use pikesquares_bootstrap::bootstrap::{Services, configure, install};
use pikesquares_bootstrap::cli::{Cli, Command};
use pikesquares_bootstrap::context::BootstrapContext;
use pikesquares_bootstrap::dirs::SystemBaseDirs;
use pikesquares_bootstrap::error::Result;
use pikesquares_bootstrap::exec::SystemCommandExecutor;
use pikesquares_bootstrap::fetch::HttpFetcher;
use pikesquares_bootstrap::localdev::{InquirePrompter, git_available};
use pikesquares_bootstrap::output::{
    configure_summary, install_summary, write_stderr_line,
};
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.command.common().debug);
    let mut stderr = std::io::stderr();
    let run_result = run(cli, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn init_logging(debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    Builder::from_env(Env::default().default_filter_or(level.as_str()))
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli, stderr: &mut dyn Write) -> Result<()> {
    // The hand-off path is checked before anything touches the filesystem.
    let ctx = BootstrapContext::from_process()?;

    let fetcher = HttpFetcher::new(cli.command.common().fetch_timeout());
    let services = Services {
        dirs: &SystemBaseDirs,
        fetcher: &fetcher,
        executor: &SystemCommandExecutor,
        prompter: &InquirePrompter,
        git_available: git_available(),
    };

    match cli.command {
        Command::Configure(args) => {
            let outcome = configure(&ctx, &args.into(), &services)?;
            write_stderr_line(stderr, configure_summary(&outcome));
        }
        Command::Install(args) => {
            let outcome = install(&ctx, &args.into(), &services)?;
            write_stderr_line(stderr, install_summary(&outcome));
        }
    }
    Ok(())
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, err);
            1
        }
    }
}
