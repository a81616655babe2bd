//! QuantSim CLI: backtest, comparison and Monte Carlo commands.
//!
//! Commands:
//! - `run`: backtest one or every configured strategy, optionally saving artifacts
//! - `compare`: run every strategy over every lookback period and rank them
//! - `monte-carlo`: perturb execution costs and report the outcome distribution
//!
//! Every command reads the same TOML config (`--config`); without one the
//! built-in defaults and the synthetic bar series are used.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use quantsim_runner::comparison::{compare_strategies, ComparisonReport};
use quantsim_runner::config::{load_config, QuantSimConfig, StrategyConfig};
use quantsim_runner::export::{save_artifacts, write_json};
use quantsim_runner::monte_carlo::{run_monte_carlo, MonteCarloReport};
use quantsim_runner::runner::{run_backtest, BacktestResult, MarketData};

#[derive(Parser)]
#[command(
    name = "quantsim",
    version,
    about = "QuantSim CLI: signal-driven backtesting with cost modelling"
)]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Read bars from this CSV instead of the configured source.
    #[arg(long, global = true)]
    csv: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest a strategy from the config.
    Run {
        /// Strategy name. Runs every configured strategy when omitted.
        #[arg(long)]
        strategy: Option<String>,

        /// Directory for result.json, trades.csv and equity.csv.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Compare every configured strategy across the lookback periods.
    Compare {
        /// Write the full report as JSON to this file.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Monte Carlo over perturbed execution costs.
    MonteCarlo {
        /// Strategy name. Defaults to the first configured strategy.
        #[arg(long)]
        strategy: Option<String>,

        /// Override the configured sample count.
        #[arg(long)]
        samples: Option<usize>,

        /// Override the configured seed.
        #[arg(long)]
        seed: Option<u64>,

        /// Write the full report as JSON to this file.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let (mut config, base_dir) = match &cli.config {
        Some(path) => (load_config(path)?, config_dir(path)),
        None => (QuantSimConfig::default(), PathBuf::from(".")),
    };
    if let Some(csv) = cli.csv {
        config.data.csv = Some(csv);
    }
    info!(config_id = config.run_id().short(), "configuration loaded");

    let bars = config
        .load_bars(&base_dir)
        .context("failed to load market data")?;
    let data = MarketData::new(bars);

    match cli.command {
        Commands::Run {
            strategy,
            output_dir,
        } => run_cmd(&config, &data, strategy.as_deref(), output_dir.as_deref()),
        Commands::Compare { output } => compare_cmd(&config, &data, output.as_deref()),
        Commands::MonteCarlo {
            strategy,
            samples,
            seed,
            output,
        } => {
            if let Some(samples) = samples {
                config.monte_carlo.samples = samples;
            }
            if seed.is_some() {
                config.monte_carlo.seed = seed;
            }
            monte_carlo_cmd(&config, &data, strategy.as_deref(), output.as_deref())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn config_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

fn select_strategies<'a>(config: &'a QuantSimConfig, name: Option<&str>) -> Result<Vec<&'a StrategyConfig>> {
    match name {
        Some(name) => match config.strategy(name) {
            Some(s) => Ok(vec![s]),
            None => {
                let known: Vec<&str> = config.strategies.iter().map(|s| s.name.as_str()).collect();
                bail!("unknown strategy '{name}'. Configured: {}", known.join(", "))
            }
        },
        None => Ok(config.strategies.iter().collect()),
    }
}

// ─── run ────────────────────────────────────────────────────────────

fn run_cmd(
    config: &QuantSimConfig,
    data: &MarketData,
    strategy: Option<&str>,
    output_dir: Option<&Path>,
) -> Result<()> {
    for selected in select_strategies(config, strategy)? {
        let result = run_backtest(
            data,
            &selected.registry()?,
            &selected.definition(),
            &config.backtest,
            None,
        )
        .with_context(|| format!("backtest of '{}' failed", selected.name))?;

        print_summary(&result);

        if let Some(dir) = output_dir {
            let run_dir = save_artifacts(&result, dir)?;
            println!("Artifacts saved to: {}", run_dir.display());
        }
    }
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    println!();
    println!("=== Backtest Result ===");
    println!("Strategy:       {}", result.strategy.name);
    println!("Run ID:         {}", result.run_id.short());
    println!(
        "Bars:           {} ({} warm-up, {} evaluated)",
        result.bar_count, result.warmup_bars, result.bars_evaluated
    );
    println!(
        "Signals:        {} accepted / {} raw",
        result.signal_stats.accepted, result.signal_stats.raw_signals
    );
    println!(
        "Trades:         {} closed, {} open",
        m.total_trades,
        result.open_trades.len()
    );
    println!();
    println!("--- Performance ---");
    println!("Initial:        {:.2}", result.initial_capital);
    println!("Final Equity:   {:.2}", result.final_equity);
    println!("Total Return:   {:.2}%", m.total_return_pct);
    println!("Annualized:     {:.2}%", m.annualized_return * 100.0);
    if let Some(bh) = result.buy_and_hold_return() {
        println!("Buy & Hold:     {:.2}%", bh * 100.0);
    }
    println!("Sharpe:         {:.3}", m.sharpe_ratio);
    println!("Sortino:        {:.3}", m.sortino_ratio);
    println!("Calmar:         {:.3}", m.calmar_ratio);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("Expectancy:     {:.2}", m.expectancy);
    println!("Kelly:          {:.3}", m.kelly_criterion);
    println!("VaR 95:         {:.4}", m.tail.var_95);
    println!("CVaR 95:        {:.4}", m.tail.cvar_95);
    println!("Fees:           {:.2}", m.total_fees);
    println!("Max Consec Win: {}", m.max_consecutive_wins);
    println!("Max Consec Loss:{}", m.max_consecutive_losses);
    if result.signal_stats.provider_failures > 0 {
        println!();
        println!(
            "WARNING: {} provider call(s) failed",
            result.signal_stats.provider_failures
        );
    }
    if !result.margin_calls.is_empty() {
        println!("WARNING: {} margin call(s)", result.margin_calls.len());
    }
    println!();
}

// ─── compare ────────────────────────────────────────────────────────

fn compare_cmd(config: &QuantSimConfig, data: &MarketData, output: Option<&Path>) -> Result<()> {
    let candidates = config.candidates()?;
    let report = compare_strategies(data, &candidates, &config.backtest, &config.comparison, None);
    print_comparison(&report);

    if let Some(path) = output {
        write_json(&report, path)?;
        println!("Report saved to: {}", path.display());
    }
    if report.runs.is_empty() {
        bail!("every comparison run failed");
    }
    Ok(())
}

fn print_comparison(report: &ComparisonReport) {
    println!();
    println!("=== Strategy Comparison ===");
    println!(
        "{:<4} {:<20} {:>8} {:>9} {:>10} {:>8} {:>7} {:>9}",
        "Rank", "Strategy", "Periods", "Sharpe", "Return %", "MaxDD %", "Consist", "Composite"
    );
    println!("{}", "-".repeat(82));
    for (position, ranking) in report.ranking.iter().enumerate() {
        let Some(s) = report.summary(&ranking.strategy) else {
            continue;
        };
        println!(
            "{:<4} {:<20} {:>8} {:>9.3} {:>10.2} {:>8.2} {:>7.3} {:>9.2}",
            position + 1,
            s.strategy,
            s.periods_run,
            s.mean_sharpe,
            s.mean_return_pct,
            s.worst_drawdown * 100.0,
            s.consistency,
            ranking.composite_score
        );
    }

    if report.correlation.strategies.len() >= 2 {
        println!();
        println!("--- Correlation ---");
        for (name, row) in report.correlation.strategies.iter().zip(&report.correlation.values) {
            let cells: Vec<String> = row.iter().map(|v| format!("{v:>6.2}")).collect();
            println!("{name:<20} {}", cells.join(" "));
        }
    }
    if let Some(allocation) = &report.allocation {
        println!();
        println!("--- Suggested Weights ---");
        for (name, weight) in allocation.strategies.iter().zip(&allocation.weights) {
            println!("{name:<20} {:>6.1}%", weight * 100.0);
        }
        println!(
            "Expected {:.2}%  Volatility {:.2}%  Sharpe {:.3}",
            allocation.stats.expected_return * 100.0,
            allocation.stats.volatility * 100.0,
            allocation.stats.sharpe
        );
    }
    if let Some(best) = report.frontier.as_ref().and_then(|f| f.best_sharpe.as_ref()) {
        println!("Frontier best Sharpe: {:.3}", best.stats.sharpe);
    }

    for failure in &report.failures {
        println!(
            "WARNING: {} @ {} bars failed: {}",
            failure.strategy, failure.period, failure.error
        );
    }
    println!();
}

// ─── monte-carlo ────────────────────────────────────────────────────

fn monte_carlo_cmd(
    config: &QuantSimConfig,
    data: &MarketData,
    strategy: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let selected = match strategy {
        Some(name) => config
            .strategy(name)
            .with_context(|| format!("unknown strategy '{name}'"))?,
        None => config
            .strategies
            .first()
            .context("no strategies configured")?,
    };
    let report = run_monte_carlo(
        data,
        &selected.registry()?,
        &selected.definition(),
        &config.backtest,
        &config.monte_carlo,
        None,
    )?;
    print_monte_carlo(&report);

    if let Some(path) = output {
        write_json(&report, path)?;
        println!("Report saved to: {}", path.display());
    }
    Ok(())
}

fn print_monte_carlo(report: &MonteCarloReport) {
    println!();
    println!("=== Monte Carlo: {} ===", report.strategy);
    println!(
        "Samples:        {} completed, {} failed",
        report.samples.len(),
        report.failed
    );
    println!("Success Rate:   {:.1}%", report.success_rate * 100.0);
    println!();
    println!("{:<14} {:>10} {:>10} {:>10} {:>10}", "Metric", "Mean", "Std", "P5", "P95");
    println!("{}", "-".repeat(58));
    for (label, d) in [
        ("Return %", &report.total_return_pct),
        ("Sharpe", &report.sharpe),
        ("Max DD", &report.max_drawdown),
    ] {
        println!(
            "{label:<14} {:>10.3} {:>10.3} {:>10.3} {:>10.3}",
            d.mean, d.std_dev, d.p5, d.p95
        );
    }
    println!();
}
