//! CLI command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Subcommand;
use tokio::fs;
use xdcmesh_core::{EventKind, MeshConfig, MeshEvent};
use xdcmesh_sim::{GeneratorConfig, Scenario, ScenarioReport, ScenarioRunner, random_scenario};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a scenario file
    Run {
        /// Path to the scenario JSON file
        scenario: PathBuf,
        /// Print the full report as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Run a randomly generated scenario and check invariants
    Fuzz {
        /// Generator seed, defaults to XDCMESH_SEED or the configured seed
        #[arg(long)]
        seed: Option<u64>,
        /// Number of instances
        #[arg(short, long, default_value = "3")]
        instances: usize,
        /// Number of random steps
        #[arg(short, long, default_value = "200")]
        steps: usize,
    },
    /// Play the hello/bye session and print its event feed
    Demo,
}

/// Handle the CLI command
///
/// # Errors
/// Returns an error if the scenario cannot be loaded or an invariant is violated
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run { scenario, json } => run_scenario_file(&scenario, json).await,
        Commands::Fuzz {
            seed,
            instances,
            steps,
        } => fuzz(seed, instances, steps).await,
        Commands::Demo => demo().await,
    }
}

/// Load and run a scenario file
///
/// # Errors
/// - The file cannot be read or is not a valid scenario
/// - The run violated an invariant
pub async fn run_scenario_file(path: &Path, json: bool) -> anyhow::Result<()> {
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read scenario {}", path.display()))?;
    let scenario = Scenario::from_json(&text)
        .with_context(|| format!("Failed to parse scenario {}", path.display()))?;
    scenario.validate()?;

    let report = ScenarioRunner::new().run(&scenario)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.summary());
    }

    ensure_success(&report)
}

/// Generate and run a random scenario
///
/// # Errors
/// - The run violated an invariant
pub async fn fuzz(seed: Option<u64>, instances: usize, steps: usize) -> anyhow::Result<()> {
    let seed = seed.unwrap_or_else(|| MeshConfig::from_env().simulation.seed);
    let scenario = random_scenario(GeneratorConfig {
        seed,
        instances,
        steps,
    });

    println!(
        "Fuzzing with seed {seed}: {instances} instances, {} steps",
        scenario.steps.len()
    );

    let report = ScenarioRunner::new().run(&scenario)?;
    print!("{}", report.summary());

    ensure_success(&report)
}

/// Play the built-in hello/bye session
///
/// # Errors
/// - The run violated an invariant
pub async fn demo() -> anyhow::Result<()> {
    let report = ScenarioRunner::new().run(&Scenario::hello_bye())?;

    println!("Event feed");
    println!("{:-<60}", "");
    for event in &report.events {
        println!("{}", format_event(event));
    }
    println!();
    print!("{}", report.summary());

    ensure_success(&report)
}

fn ensure_success(report: &ScenarioReport) -> anyhow::Result<()> {
    if !report.is_success() {
        bail!(
            "Scenario '{}' violated {} invariant(s)",
            report.name,
            report.violations.len()
        );
    }
    Ok(())
}

fn format_event(event: &MeshEvent) -> String {
    let detail = match &event.kind {
        EventKind::Sent { update, descr } | EventKind::Received { update, descr } => {
            format!("serial {}/{} {} {}", update.serial, update.max_serial, update.payload, descr)
        }
        EventKind::RealtimeSent { data } => format!("{} bytes", data.len()),
        EventKind::Connect | EventKind::Clear => String::new(),
    };

    format!(
        "{} [{}] {:<8} epoch {} {:<13} {}",
        event.timestamp.format("%H:%M:%S%.3f"),
        event.color,
        event.instance_id,
        event.epoch,
        event.kind.as_str(),
        detail
    )
    .trim_end()
    .to_string()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn test_run_scenario_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let text = serde_json::to_string(&Scenario::hello_bye()).unwrap();
        file.write_all(text.as_bytes()).unwrap();

        run_scenario_file(file.path(), false).await.unwrap();
        run_scenario_file(file.path(), true).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_scenario_file(&dir.path().join("missing.json"), false).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_empty_scenario_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"name": "empty", "steps": []}"#).unwrap();

        assert!(run_scenario_file(file.path(), false).await.is_err());
    }

    #[tokio::test]
    async fn test_fuzz_and_demo() {
        fuzz(Some(7), 3, 50).await.unwrap();
        demo().await.unwrap();
    }

    #[test]
    fn test_format_event() {
        let report = ScenarioRunner::new().run(&Scenario::hello_bye()).unwrap();
        let sent = report
            .events
            .iter()
            .find(|event| matches!(event.kind, EventKind::Sent { .. }))
            .unwrap();

        let line = format_event(sent);
        assert!(line.contains("3001"));
        assert!(line.contains("sent"));
        assert!(line.contains("serial 1/1"));
    }
}
