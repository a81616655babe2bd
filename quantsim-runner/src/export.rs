//! Export: JSON and CSV artifacts.
//!
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: trade tape and equity curve for external analysis tools
//!
//! Persisted results carry a `schema_version`; newer versions are rejected
//! on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;

use quantsim_core::domain::{ClosedTrade, EquityPoint};

use crate::runner::{BacktestResult, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `BacktestResult` to pretty JSON.
pub fn export_json(result: &BacktestResult) -> Result<String> {
    to_pretty_json(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON, rejecting newer schema versions.
///
/// The returned result carries no market data.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

/// Pretty JSON for any report (comparison, Monte Carlo).
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize report to JSON")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Trade tape, one row per closed trade.
pub fn export_trades_csv(trades: &[ClosedTrade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "id",
        "source",
        "direction",
        "entry_bar",
        "entry_time",
        "entry_price",
        "exit_bar",
        "exit_time",
        "exit_price",
        "quantity",
        "stop_loss",
        "take_profit",
        "exit_reason",
        "gross_pnl",
        "commission",
        "slippage",
        "total_cost",
        "realized_pnl",
        "risk_reward",
        "outcome",
    ])?;

    for t in trades {
        wtr.write_record([
            &t.id.to_string(),
            &t.source,
            &format!("{:?}", t.direction),
            &t.entry_bar.to_string(),
            &t.entry_time.to_rfc3339(),
            &format!("{:.6}", t.entry_price),
            &t.exit_bar.to_string(),
            &t.exit_time.to_rfc3339(),
            &format!("{:.6}", t.exit_price),
            &format!("{:.6}", t.quantity),
            &format!("{:.6}", t.stop_loss),
            &t.take_profit.map(|tp| format!("{tp:.6}")).unwrap_or_default(),
            &t.exit_reason.to_string(),
            &format!("{:.2}", t.gross_pnl),
            &format!("{:.2}", t.costs.commission),
            &format!("{:.2}", t.costs.execution_drag()),
            &format!("{:.2}", t.costs.total),
            &format!("{:.2}", t.realized_pnl),
            &format!("{:.4}", t.risk_reward_ratio),
            &format!("{:?}", t.outcome).to_uppercase(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Equity curve with timestamp, equity and drawdown columns.
pub fn export_equity_csv(equity_curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "equity", "drawdown"])?;
    for p in equity_curve {
        wtr.write_record([
            &p.timestamp.to_rfc3339(),
            &format!("{:.2}", p.equity),
            &format!("{:.6}", p.drawdown),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the artifact set for a single run.
///
/// Creates `{strategy}_{run_id prefix}/` under `output_dir` containing
/// `result.json`, `trades.csv` and `equity.csv`. Returns the directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!("{}_{}", sanitize(&result.strategy.name), result.run_id.short());
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("result.json"), export_json(result)?)?;
    std::fs::write(run_dir.join("trades.csv"), export_trades_csv(&result.closed_trades)?)?;
    std::fs::write(run_dir.join("equity.csv"), export_equity_csv(&result.equity_curve)?)?;

    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let path = dir.join("result.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

/// Write any serializable report as pretty JSON.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = to_pretty_json(value)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
