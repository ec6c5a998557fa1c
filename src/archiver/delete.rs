use crate::archiver::reconcile::VerifiedIds;
use crate::helpdesk::{ConversationSource, Lookup};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct DeletionOutcome {
    pub requested: usize,
    pub confirmed: Vec<String>,
    pub unconfirmed: Vec<String>,
    pub delete_errors: usize,
}

impl DeletionOutcome {
    pub fn discrepancy(&self) -> usize {
        self.requested.saturating_sub(self.confirmed.len())
    }
}

/// Delete each archived conversation, then look it up again and count it
/// gone only when the source answers not-found. Runs one id at a time; a
/// failure on one id never stops the rest.
pub fn delete_and_confirm(source: &dyn ConversationSource, ids: &VerifiedIds) -> DeletionOutcome {
    let mut out = DeletionOutcome {
        requested: ids.len(),
        ..DeletionOutcome::default()
    };

    for id in ids.as_slice() {
        if let Err(err) = source.delete_by_id(id) {
            error!(id = %id, "delete request failed: {err:#}");
            out.delete_errors += 1;
        }

        match source.get_by_id(id) {
            Ok(Lookup::NotFound) => out.confirmed.push(id.clone()),
            Ok(Lookup::Found(_)) => {
                warn!(id = %id, "conversation still present after delete");
                out.unconfirmed.push(id.clone());
            }
            Err(err) => {
                warn!(id = %id, "could not confirm deletion: {err:#}");
                out.unconfirmed.push(id.clone());
            }
        }
    }

    info!(
        stage = "delete",
        requested = out.requested,
        confirmed = out.confirmed.len(),
        "deletion pass finished"
    );
    out
}
