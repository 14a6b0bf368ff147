//! Shared state wired through the Storage Element handlers.

use std::sync::Arc;

use artstore_model::{Capacity, InstanceRole, OperationKind, ReplicaMode, SeInfo, SeStatus};
use artstore_store::{AttrStore, BlobStore, FileIndex, ModeMachine, Reconciler};
use artstore_telemetry::Metrics;

/// Software version reported by `/info` and the health endpoints.
pub(crate) const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Dependencies shared by every Storage Element handler.
pub struct SeState {
    /// Self-declared element identifier.
    pub storage_id: String,
    /// Configured capacity limit in bytes.
    pub capacity_bytes: i64,
    /// Deployment flavour.
    pub replica_mode: ReplicaMode,
    /// Declarative instance role.
    pub instance_role: InstanceRole,
    /// Leader address, meaningful only for followers.
    pub leader_url: Option<String>,
    /// Blob persistence.
    pub blobs: BlobStore,
    /// Sidecar persistence.
    pub attrs: AttrStore,
    /// In-memory metadata index.
    pub index: Arc<FileIndex>,
    /// Mode state machine.
    pub mode: Arc<ModeMachine>,
    /// Disk-versus-index auditor, exposed for the maintenance endpoint.
    pub reconciler: Arc<Reconciler>,
    /// Metrics registry.
    pub metrics: Metrics,
}

impl SeState {
    /// Current public info document.
    #[must_use]
    pub fn info(&self) -> SeInfo {
        let mode = self.mode.current();
        let used = self.index.total_active_size();
        SeInfo {
            storage_id: self.storage_id.clone(),
            mode,
            status: self.status(),
            version: VERSION.to_string(),
            allowed_operations: mode.allowed_operations().to_vec(),
            capacity: Capacity::from_usage(self.capacity_bytes, used),
            replica_mode: Some(self.replica_mode),
            role: Some(self.instance_role),
        }
    }

    /// Reported status: degraded until the index has been built from disk.
    #[must_use]
    pub fn status(&self) -> SeStatus {
        if self.index.is_ready() {
            SeStatus::Online
        } else {
            SeStatus::Degraded
        }
    }

    /// Whether the current mode admits `operation`.
    #[must_use]
    pub fn can_perform(&self, operation: OperationKind) -> bool {
        self.mode.can_perform(operation)
    }
}
