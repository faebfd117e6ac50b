//! The automation entry point: fetch, evaluate, step, persist, report.

use std::path::Path;
use std::process::ExitCode;

use pinion_core::{
    Decision, EvaluationResult, RolloutConfig, ScheduleConfig, Settings, epoch_secs,
};
use pinion_health::Evaluator;
use pinion_metrics::{FileSource, fetch_pair};
use pinion_rollout::Controller;
use pinion_state::{
    DocumentStore, FileDocumentStore, RolloutDocument, UpdateSource, update_with_retry,
};
use tracing::info;

use super::MAX_WRITE_ATTEMPTS;

pub struct EvaluateOpts {
    pub analyze_only: bool,
    pub skip_report_file: bool,
    pub metrics: Option<String>,
}

pub async fn run(settings: &Settings, opts: EvaluateOpts) -> anyhow::Result<ExitCode> {
    let metrics_path = opts
        .metrics
        .as_deref()
        .unwrap_or(&settings.metrics.path)
        .to_string();
    let source = FileSource::new(Path::new(&metrics_path));

    // The two snapshots are independent reads; fetch them concurrently.
    let (stable, canary) = fetch_pair(&source).await?;

    let now = epoch_secs();
    let evaluator = Evaluator::new(settings.thresholds.clone());
    let evaluation = evaluator.evaluate(&stable, &canary, now);

    println!(
        "decision: {} (confidence {:.1})",
        evaluation.decision, evaluation.confidence
    );
    println!("reason:   {}", evaluation.reason);
    println!(
        "relative error increase: {:+.4}",
        evaluation.relative_error_increase
    );

    let controller = Controller::new();
    let schedule = settings.schedule_config();
    let store = FileDocumentStore::new(Path::new(&settings.document.path));

    if opts.analyze_only {
        let current = load_config(&store, settings)?;
        let next = next_config(&controller, &current, &evaluation, &schedule, now);
        println!(
            "would set: {:.1}% (status {})",
            next.current_percentage, next.status
        );
    } else {
        let written = update_with_retry(&store, MAX_WRITE_ATTEMPTS, |current| {
            let config = current
                .map(|d| d.to_config(&settings.rollout))
                .unwrap_or_else(|| settings.initial_config());
            let next = next_config(&controller, &config, &evaluation, &schedule, now);
            RolloutDocument::from_config(&next, UpdateSource::Automated, now)
        })?;
        info!(
            percentage = written.distribution.canary_percentage,
            status = %written.distribution.status,
            "rollout document updated"
        );
        println!(
            "persisted: {:.1}% (status {})",
            written.distribution.canary_percentage, written.distribution.status
        );
    }

    if !opts.skip_report_file {
        write_report(Path::new(&settings.report.path), &evaluation)?;
        println!("report written to {}", settings.report.path);
    }

    // Exit code is the CI contract: 2 tells downstream automation the
    // canary breached the rollback gate.
    Ok(if evaluation.decision == Decision::Rollback {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    })
}

/// One automated transition: the evaluator's verdict applies first, then
/// the gradual-rollout ramp, which may only ever raise a PROCEED result.
/// Any evaluator veto suppresses the ramp for this cycle.
fn next_config(
    controller: &Controller,
    config: &RolloutConfig,
    evaluation: &EvaluationResult,
    schedule: &ScheduleConfig,
    now: u64,
) -> RolloutConfig {
    let mut next = controller.step(config, evaluation);
    // The status check keeps the ramp away from a sticky rollback, which
    // `step` leaves untouched even on PROCEED.
    if schedule.enabled
        && evaluation.decision == Decision::Proceed
        && next.status == pinion_core::RolloutStatus::Active
    {
        let target = pinion_schedule::current_target(&next, schedule, now);
        if target > next.current_percentage {
            next.current_percentage = target.min(next.max_percentage);
        }
    }
    next
}

fn load_config(store: &FileDocumentStore, settings: &Settings) -> anyhow::Result<RolloutConfig> {
    Ok(store
        .load()?
        .document
        .map(|d| d.to_config(&settings.rollout))
        .unwrap_or_else(|| settings.initial_config()))
}

fn write_report(path: &Path, evaluation: &EvaluationResult) -> anyhow::Result<()> {
    let mut bytes = serde_json::to_vec_pretty(evaluation)?;
    bytes.push(b'\n');
    std::fs::write(path, bytes)?;
    Ok(())
}
