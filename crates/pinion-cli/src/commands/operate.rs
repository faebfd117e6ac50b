//! Operator commands: manual override, resume, status.

use std::path::Path;
use std::process::ExitCode;

use pinion_core::{Settings, epoch_secs};
use pinion_rollout::Controller;
use pinion_state::{
    DocumentStore, FileDocumentStore, RolloutDocument, UpdateSource, update_with_retry,
};

use super::MAX_WRITE_ATTEMPTS;

/// Manual percentage override, bypassing the evaluator. Always available,
/// whatever the current status.
pub fn override_percentage(settings: &Settings, percentage: f64) -> anyhow::Result<ExitCode> {
    let controller = Controller::new();

    // Surface an out-of-range percentage before touching the store; the
    // validation depends only on the value itself.
    controller.apply_manual(&settings.initial_config(), percentage)?;

    let store = FileDocumentStore::new(Path::new(&settings.document.path));
    let now = epoch_secs();
    let written = update_with_retry(&store, MAX_WRITE_ATTEMPTS, |current| {
        let config = current
            .map(|d| d.to_config(&settings.rollout))
            .unwrap_or_else(|| settings.initial_config());
        let next = match controller.apply_manual(&config, percentage) {
            Ok(next) => next,
            Err(_) => unreachable!(), // validated above
        };
        RolloutDocument::from_config(&next, UpdateSource::Manual, now)
    })?;

    println!(
        "percentage set to {:.1}% (status {})",
        written.distribution.canary_percentage, written.distribution.status
    );
    Ok(ExitCode::SUCCESS)
}

/// Reset a paused or rolled-back rollout to ACTIVE.
pub fn resume(settings: &Settings) -> anyhow::Result<ExitCode> {
    let controller = Controller::new();
    let store = FileDocumentStore::new(Path::new(&settings.document.path));
    let now = epoch_secs();

    let written = update_with_retry(&store, MAX_WRITE_ATTEMPTS, |current| {
        let config = current
            .map(|d| d.to_config(&settings.rollout))
            .unwrap_or_else(|| settings.initial_config());
        let next = controller.resume(&config);
        RolloutDocument::from_config(&next, UpdateSource::Manual, now)
    })?;

    println!(
        "rollout {} at {:.1}%",
        written.distribution.status, written.distribution.canary_percentage
    );
    Ok(ExitCode::SUCCESS)
}

/// Print the persisted rollout document.
pub fn status(settings: &Settings) -> anyhow::Result<ExitCode> {
    let store = FileDocumentStore::new(Path::new(&settings.document.path));
    match store.load()?.document {
        Some(document) => println!("{}", serde_json::to_string_pretty(&document)?),
        None => println!("no rollout document at {}", settings.document.path),
    }
    Ok(ExitCode::SUCCESS)
}
