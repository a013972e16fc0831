//! RegimeGate CLI — run each pipeline stage and the per-asset policy tools.
//!
//! Commands:
//! - `status` — aggregate the eight check artifacts into `STATUS.json`
//! - `drift` — compare the two latest runs and record the drift decision
//! - `deploy` — write the run's `deployment_gate.json`
//! - `publish` — write `publish_decision.json` from the recorded chain
//! - `gate` — evaluate asset metrics (JSONL) into a new run snapshot
//! - `select` — pick a model for a regime from a registry CSV
//! - `thresholds` — resolve risk thresholds for a ticker
//!
//! `status`, `drift`, `deploy` and `publish` exit with code 1 when their
//! decision is fail or blocked. Logs go to stderr; stdout carries the
//! one-line summary.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use regimegate_core::{
    parse_finite_str, select_model_for_regime, GateConfig, Proxy, Registry, ThresholdStore,
};
use regimegate_runner::layout::DEFAULT_LAYOUT_FILE;
use regimegate_runner::{
    evaluate_assets, write_snapshot, DeploymentStage, DiffStatus, DriftGuard, LatestRunPointer,
    PipelineConfig, PublishGate, StatusAggregator,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(
    name = "regimegate",
    about = "RegimeGate CLI — regime-aware validation and deployment gate"
)]
struct Cli {
    /// Pipeline layout (TOML). Defaults to ./regimegate.toml when present.
    #[arg(long, global = true)]
    layout: Option<PathBuf>,

    /// Override the layout's root directory.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate check artifacts into STATUS.json and STATUS.md.
    Status,
    /// Compare the two latest runs and record the drift decision.
    Drift,
    /// Combine status and drift into the run's deployment gate.
    Deploy,
    /// Decide whether the latest run may be published.
    Publish,
    /// Evaluate asset metrics into a new run snapshot.
    Gate {
        /// JSONL file with one asset record per line.
        #[arg(long)]
        input: PathBuf,

        /// Run identifier (directory name under the snapshots root).
        #[arg(long)]
        run_id: String,

        /// Gate configuration. Defaults to the layout's gate config.
        #[arg(long)]
        gate_config: Option<PathBuf>,

        /// Do not update the latest-run pointer.
        #[arg(long, default_value_t = false)]
        no_pointer: bool,
    },
    /// Select a model for an asset/timeframe/regime from a registry CSV.
    Select {
        #[arg(long)]
        registry: PathBuf,

        #[arg(long)]
        asset: String,

        #[arg(long)]
        timeframe: String,

        #[arg(long)]
        regime: String,

        /// Regime classifier confidence.
        #[arg(long)]
        confidence: String,

        /// Novelty score of the current observation.
        #[arg(long)]
        novelty: String,

        /// Error column to rank models by.
        #[arg(long, default_value = "mase")]
        metric: String,
    },
    /// Resolve risk-proxy thresholds for a ticker.
    Thresholds {
        #[arg(long)]
        ticker: String,

        /// daily or weekly.
        #[arg(long, default_value = "daily")]
        timeframe: String,

        #[arg(long)]
        group: Option<String>,

        /// Threshold calibration file. Defaults to the layout's threshold config.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Proxy scores to check, e.g. `--score stress=0.82`.
        #[arg(long = "score")]
        scores: Vec<String>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "regimegate=info,regimegate_core=info,regimegate_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let layout = load_layout(cli.layout.as_deref(), cli.root)?;

    let ok = match cli.command {
        Commands::Status => run_status(&layout)?,
        Commands::Drift => run_drift(&layout)?,
        Commands::Deploy => run_deploy(&layout)?,
        Commands::Publish => run_publish(&layout)?,
        Commands::Gate {
            input,
            run_id,
            gate_config,
            no_pointer,
        } => run_gate(&layout, &input, &run_id, gate_config, no_pointer)?,
        Commands::Select {
            registry,
            asset,
            timeframe,
            regime,
            confidence,
            novelty,
            metric,
        } => run_select(&registry, &asset, &timeframe, &regime, &confidence, &novelty, &metric)?,
        Commands::Thresholds {
            ticker,
            timeframe,
            group,
            config,
            scores,
        } => run_thresholds(&layout, &ticker, &timeframe, group.as_deref(), config, &scores)?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn load_layout(path: Option<&Path>, root: Option<PathBuf>) -> Result<PipelineConfig> {
    let mut layout = match path {
        Some(path) => PipelineConfig::from_file(path)?,
        None if Path::new(DEFAULT_LAYOUT_FILE).exists() => {
            PipelineConfig::from_file(Path::new(DEFAULT_LAYOUT_FILE))?
        }
        None => PipelineConfig::default(),
    };
    if let Some(root) = root {
        layout.root = root;
    }
    Ok(layout)
}

// ─── Pipeline stages ─────────────────────────────────────────────────

fn run_status(layout: &PipelineConfig) -> Result<bool> {
    let payload = StatusAggregator::new(layout).run()?;
    let passing = 8 - payload.gate_checks.failing().len();
    println!(
        "status: {} ({passing}/8 checks) -> {}",
        payload.status,
        layout.status_json().display()
    );
    Ok(payload.passed())
}

fn run_drift(layout: &PipelineConfig) -> Result<bool> {
    let summary = DriftGuard::new(layout).run()?;
    match summary.status {
        DiffStatus::Fail => {
            println!(
                "drift: fail ({})",
                summary.reason.as_deref().unwrap_or("unknown")
            );
            Ok(false)
        }
        DiffStatus::Ok => {
            let reasons = summary
                .deployment_gate
                .as_ref()
                .map(|g| g.reasons.join(","))
                .unwrap_or_default();
            println!(
                "drift: {} -> {} blocked={} {}",
                summary.prev_run.as_deref().unwrap_or("-"),
                summary.cur_run.as_deref().unwrap_or("-"),
                summary.blocked(),
                reasons
            );
            Ok(!summary.blocked())
        }
    }
}

fn run_deploy(layout: &PipelineConfig) -> Result<bool> {
    let (run_dir, gate) = DeploymentStage::new(layout).run()?;
    println!(
        "deploy: publish_allowed={} [{}] -> {}",
        gate.publish_allowed,
        gate.blocked_reasons.join(","),
        run_dir.display()
    );
    Ok(gate.publish_allowed)
}

fn run_publish(layout: &PipelineConfig) -> Result<bool> {
    let decision = PublishGate::new(layout).run()?;
    println!(
        "publish: {} run={} [{}]",
        decision.status,
        decision.run_id.as_deref().unwrap_or("-"),
        decision.reasons.join(",")
    );
    Ok(decision.publish_allowed)
}

// ─── Per-asset tools ─────────────────────────────────────────────────

fn read_records(path: &Path) -> Result<Vec<Value>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open asset records {}", path.display()))?;
    let mut records = Vec::new();
    for (i, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(line = i + 1, error = %e, "malformed asset record skipped"),
        }
    }
    Ok(records)
}

fn run_gate(
    layout: &PipelineConfig,
    input: &Path,
    run_id: &str,
    gate_config: Option<PathBuf>,
    no_pointer: bool,
) -> Result<bool> {
    let config_path = gate_config.unwrap_or_else(|| layout.gate_config());
    let config = GateConfig::from_file(&config_path)?;
    let records = read_records(input)?;
    let rows = evaluate_assets(&records, &config);

    let run_dir = layout.snapshots_root().join(run_id);
    let summary = write_snapshot(&run_dir, &rows)?;
    if !no_pointer {
        LatestRunPointer::new(&run_dir, &layout.root).write(&layout.latest_run_pointer())?;
    }

    println!(
        "gate: run {} validated {}/{} ({:.1}%)",
        summary.run_id,
        summary.n_validated,
        summary.n_assets,
        summary.validated_ratio * 100.0
    );
    Ok(true)
}

fn run_select(
    registry: &Path,
    asset: &str,
    timeframe: &str,
    regime: &str,
    confidence: &str,
    novelty: &str,
    metric: &str,
) -> Result<bool> {
    let registry = Registry::from_csv_path(registry)?;
    // unparsable inputs become NaN, which the selector treats as unstable
    let confidence = parse_finite_str(confidence).unwrap_or(f64::NAN);
    let novelty = parse_finite_str(novelty).unwrap_or(f64::NAN);

    let decision =
        select_model_for_regime(&registry, asset, timeframe, regime, confidence, novelty, metric);
    println!("{}", serde_json::to_string(&decision)?);
    Ok(true)
}

fn parse_score(text: &str) -> Result<(Proxy, f64)> {
    let Some((name, value)) = text.split_once('=') else {
        bail!("score must be proxy=value, got {text:?}");
    };
    let name = name.trim().to_ascii_lowercase();
    let Some(proxy) = Proxy::ALL.into_iter().find(|p| p.as_str() == name) else {
        bail!("unknown proxy {name:?} (expected macro, stress or vol)");
    };
    let Some(value) = parse_finite_str(value) else {
        bail!("score for {name} is not a finite number: {value:?}");
    };
    Ok((proxy, value))
}

fn run_thresholds(
    layout: &PipelineConfig,
    ticker: &str,
    timeframe: &str,
    group: Option<&str>,
    config: Option<PathBuf>,
    scores: &[String],
) -> Result<bool> {
    let config_path = config.unwrap_or_else(|| layout.threshold_config());
    let store = ThresholdStore::from_file(&config_path)?;
    let thresholds = store.get_thresholds(ticker, timeframe, group);

    if scores.is_empty() {
        println!("{}", serde_json::to_string(&thresholds)?);
        return Ok(true);
    }

    let scores: BTreeMap<Proxy, f64> = scores
        .iter()
        .map(|s| parse_score(s))
        .collect::<Result<_>>()?;
    let breaches = store.breaches(ticker, timeframe, group, &scores);
    println!(
        "{}",
        serde_json::json!({"thresholds": thresholds, "breaches": breaches})
    );
    Ok(true)
}
