//! Resolve one client's variant assignment against the current rollout.

use std::path::Path;
use std::process::ExitCode;

use pinion_assign::Assigner;
use pinion_core::{ClientIdentity, Settings, epoch_secs};
use pinion_state::{AssignmentStore, DocumentStore, FileDocumentStore, RedbAssignmentStore};

pub fn run(settings: &Settings, client: &str, user: Option<&str>) -> anyhow::Result<ExitCode> {
    let document_store = FileDocumentStore::new(Path::new(&settings.document.path));
    let percentage = document_store
        .load()?
        .document
        .map(|d| d.distribution.canary_percentage)
        .unwrap_or(settings.rollout.initial_percentage);

    let store = RedbAssignmentStore::open(
        Path::new(&settings.assignments.path),
        &settings.assignments.key_prefix,
    )?;

    let identity = match user {
        Some(user) => ClientIdentity::with_user(client, user),
        None => ClientIdentity::anonymous(client),
    };

    let existing = store.load(client)?;
    let assigner = Assigner::new();
    let mut rng = rand::thread_rng();
    let assignment = assigner.assign(
        percentage,
        existing.as_ref(),
        Some(&identity),
        &mut rng,
        epoch_secs(),
    );

    // First writer wins; a concurrent assignment for the same client is
    // read back instead of overwritten.
    let persisted = store.store_if_absent(client, &assignment)?;
    println!("{client}: {}", persisted.variant);
    Ok(ExitCode::SUCCESS)
}
