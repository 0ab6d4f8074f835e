/// Result of reconciling one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerOutcome {
    Reconciled {
        label: String,
        /// Jobs found remotely and recorded.
        checked: usize,
        /// Subset of `checked` whose status moved.
        changed: usize,
        /// Tracked jobs absent from the remote listing.
        missing: usize,
        /// Jobs whose check could not be stored.
        failed: usize,
    },
    Unreachable {
        label: String,
        error: String,
    },
}

impl ServerOutcome {
    pub fn label(&self) -> &str {
        match self {
            ServerOutcome::Reconciled { label, .. } | ServerOutcome::Unreachable { label, .. } => {
                label
            }
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, ServerOutcome::Reconciled { .. })
    }
}

/// Per-server outcomes of one reconciliation pass, in configured order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub servers: Vec<ServerOutcome>,
}

impl ReconcileReport {
    pub fn outcome(&self, label: &str) -> Option<&ServerOutcome> {
        self.servers.iter().find(|outcome| outcome.label() == label)
    }

    pub fn unreachable(&self) -> impl Iterator<Item = &str> {
        self.servers
            .iter()
            .filter(|outcome| !outcome.is_reachable())
            .map(ServerOutcome::label)
    }

    pub fn total_changed(&self) -> usize {
        self.servers
            .iter()
            .map(|outcome| match outcome {
                ServerOutcome::Reconciled { changed, .. } => *changed,
                ServerOutcome::Unreachable { .. } => 0,
            })
            .sum()
    }
}

/// Outcome of one snapshot sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    /// Job IDs whose output was copied.
    pub taken: Vec<String>,
    /// Job IDs with the failure reason.
    pub failed: Vec<(String, String)>,
}
