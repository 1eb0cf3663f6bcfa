//! CLI entry point for the Kite rebalancer.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use kitebal_broker::kite::KiteBroker;
use kitebal_broker::{to_paise, to_rupees, Broker};

use kitebal_rebalancer::audit::{self, AuditLog};
use kitebal_rebalancer::basket::TargetBasket;
use kitebal_rebalancer::config::Config;
use kitebal_rebalancer::confirm::{AutoApprove, ConfirmationPolicy, InteractiveConfirm};
use kitebal_rebalancer::convergence::{ConvergenceLoop, ConvergenceSettings, RunSummary};
use kitebal_rebalancer::error::{Error, Result};
use kitebal_rebalancer::hours::{SystemClock, ThreadSleeper};

#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "Portfolio rebalancer: target basket → Zerodha Kite")]
#[command(version)]
struct Cli {
    /// Path to the target basket JSON
    basket: PathBuf,

    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Expected Kite user ID; the run aborts if the session belongs to
    /// someone else
    #[arg(long)]
    user_id: Option<String>,

    /// Place real orders (default is a dry run that only prints the plan)
    #[arg(long)]
    live: bool,

    /// Skip confirmation prompts (for automation/cron)
    #[arg(long)]
    quiet: bool,

    /// Smallest order worth placing, in rupees
    #[arg(long, default_value_t = 1000.0)]
    min_order_value: f64,

    /// Stop once the total deficit falls under this many rupees
    #[arg(long, default_value_t = 1000.0)]
    target_deficit: f64,

    /// Maximum plan/execute iterations per run
    #[arg(long, default_value_t = 10)]
    max_iterations: u32,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        match &e {
            Error::Aborted(msg) => {
                eprintln!("{msg}");
                process::exit(0);
            }
            _ => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;
    let basket = TargetBasket::load(&cli.basket)?;

    let broker = KiteBroker::new(&config.api.api_key, &config.api.access_token);
    verify_session(&broker, cli.user_id.as_deref())?;

    let mut audit_log = AuditLog::open(&config.audit_path())?;
    let dry_run = !cli.live;
    audit::log_run_started(
        &mut audit_log,
        &cli.basket.display().to_string(),
        cli.user_id.as_deref(),
        dry_run,
    )?;

    let confirm: Box<dyn ConfirmationPolicy> = if cli.quiet {
        Box::new(AutoApprove)
    } else {
        Box::new(InteractiveConfirm)
    };
    let settings = ConvergenceSettings {
        dry_run,
        quiet: cli.quiet,
        min_order_value_paise: to_paise(cli.min_order_value),
        target_deficit_paise: to_paise(cli.target_deficit),
        max_iterations: cli.max_iterations,
    };

    let clock = SystemClock;
    let sleeper = ThreadSleeper;
    let driver = ConvergenceLoop::new(
        &broker,
        &clock,
        &sleeper,
        confirm.as_ref(),
        &config.execution,
        settings,
    );

    let summary = driver.run(&basket, &mut audit_log)?;
    audit::log_run_completed(
        &mut audit_log,
        summary.iterations,
        summary.final_deficit_paise,
        summary.converged,
    )?;
    report(&summary, dry_run);
    Ok(())
}

/// Session sanity check before anything touches the account. A stale access
/// token surfaces here instead of halfway through execution, and a user-id
/// mismatch means the credentials belong to the wrong account.
fn verify_session<B: Broker>(broker: &B, expected_user_id: Option<&str>) -> Result<()> {
    let profile = broker.profile()?;
    log::info!(
        "Authenticated as {} ({})",
        profile.user_name,
        profile.user_id
    );
    if let Some(expected) = expected_user_id {
        if !profile.user_id.eq_ignore_ascii_case(expected) {
            return Err(Error::Auth(format!(
                "session belongs to {}, expected {expected}",
                profile.user_id
            )));
        }
    }
    Ok(())
}

fn report(summary: &RunSummary, dry_run: bool) {
    if dry_run {
        println!("\nDry run complete. Re-run with --live to place orders.");
        return;
    }

    println!(
        "\n{} after {} iteration(s); residual deficit ₹{:.2}",
        if summary.converged {
            "Converged"
        } else {
            "Stopped"
        },
        summary.iterations,
        to_rupees(summary.final_deficit_paise),
    );
    if !summary.submitted.is_empty() {
        println!("Orders placed:");
        for id in &summary.submitted {
            println!("  {id}");
        }
    }
    if summary.abandoned > 0 {
        println!("{} order(s) abandoned at market close", summary.abandoned);
    }
}
