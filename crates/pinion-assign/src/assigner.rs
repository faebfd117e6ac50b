//! Variant assignment logic.

use std::panic::{AssertUnwindSafe, catch_unwind};

use pinion_core::{Assignment, ClientIdentity, Variant};
use rand::Rng;
use tracing::{debug, warn};

/// Custom assignment hook: inspect the client identity and return a
/// verdict, or `None` to fall back to the random draw.
pub type CustomAssign = Box<dyn Fn(&ClientIdentity) -> Option<Variant> + Send + Sync>;

/// Assigns variants to clients.
#[derive(Default)]
pub struct Assigner {
    custom: Option<CustomAssign>,
}

impl Assigner {
    pub fn new() -> Self {
        Self { custom: None }
    }

    /// Install a custom assignment hook. The hook is consulted for new
    /// clients and re-consulted whenever a client's identity fingerprint
    /// changes; its verdict overrides the random draw.
    pub fn with_custom_assign(mut self, hook: CustomAssign) -> Self {
        self.custom = Some(hook);
        self
    }

    /// Resolve the assignment for one client visit.
    ///
    /// An existing assignment is returned unchanged unless the custom hook
    /// sees a changed identity and returns a different verdict. New clients
    /// draw `r` uniformly from `[0, 100)` and land on `canary` iff
    /// `r < percentage`.
    ///
    /// The caller persists the returned assignment; repeated calls with the
    /// same persisted assignment and identity return the identical value.
    pub fn assign<R: Rng>(
        &self,
        percentage: f64,
        existing: Option<&Assignment>,
        identity: Option<&ClientIdentity>,
        rng: &mut R,
        now: u64,
    ) -> Assignment {
        if let (Some(hook), Some(identity)) = (&self.custom, identity) {
            let fingerprint = identity.fingerprint();
            let identity_changed = existing
                .is_none_or(|a| a.identity_fingerprint.as_deref() != Some(fingerprint.as_str()));

            if identity_changed {
                return self.assign_with_hook(hook, identity, percentage, existing, rng, now);
            }
        }

        // Stability guarantee: a returning client keeps its variant.
        if let Some(existing) = existing {
            return existing.clone();
        }

        let variant = draw(rng, percentage);
        debug!(%variant, percentage, "assigned new client by draw");
        Assignment {
            variant,
            assigned_at: now,
            percentage_at_assignment: percentage,
            identity_fingerprint: identity.map(ClientIdentity::fingerprint),
        }
    }

    /// Operator force-switch: produce an assignment for `variant`
    /// regardless of any existing state or hook verdict.
    pub fn force(&self, variant: Variant, percentage: f64, now: u64) -> Assignment {
        debug!(%variant, "forced variant assignment");
        Assignment {
            variant,
            assigned_at: now,
            percentage_at_assignment: percentage,
            identity_fingerprint: None,
        }
    }

    fn assign_with_hook<R: Rng>(
        &self,
        hook: &CustomAssign,
        identity: &ClientIdentity,
        percentage: f64,
        existing: Option<&Assignment>,
        rng: &mut R,
        now: u64,
    ) -> Assignment {
        let fingerprint = identity.fingerprint();
        match run_hook(hook, identity) {
            Some(variant) => {
                if let Some(existing) = existing {
                    if existing.variant == variant {
                        // Same verdict for the new identity; refresh the
                        // fingerprint so the hook is not re-run next visit.
                        return Assignment {
                            identity_fingerprint: Some(fingerprint),
                            ..existing.clone()
                        };
                    }
                    debug!(
                        from = %existing.variant,
                        to = %variant,
                        "custom hook switched variant on identity change"
                    );
                }
                Assignment {
                    variant,
                    assigned_at: now,
                    percentage_at_assignment: percentage,
                    identity_fingerprint: Some(fingerprint),
                }
            }
            None => {
                if let Some(existing) = existing {
                    return Assignment {
                        identity_fingerprint: Some(fingerprint),
                        ..existing.clone()
                    };
                }
                let variant = draw(rng, percentage);
                Assignment {
                    variant,
                    assigned_at: now,
                    percentage_at_assignment: percentage,
                    identity_fingerprint: Some(fingerprint),
                }
            }
        }
    }
}

/// Uniform draw against the rollout percentage.
fn draw<R: Rng>(rng: &mut R, percentage: f64) -> Variant {
    let r: f64 = rng.gen_range(0.0..100.0);
    if r < percentage {
        Variant::Canary
    } else {
        Variant::Stable
    }
}

/// Run the hook, containing panics. A broken hook must never block the
/// default assignment path; a panic counts as "no verdict".
fn run_hook(hook: &CustomAssign, identity: &ClientIdentity) -> Option<Variant> {
    match catch_unwind(AssertUnwindSafe(|| hook(identity))) {
        Ok(verdict) => verdict,
        Err(_) => {
            warn!(
                client_id = %identity.client_id,
                "custom assignment hook panicked; falling back to draw"
            );
            None
        }
    }
}
