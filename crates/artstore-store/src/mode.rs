//! Operating-mode state machine with guarded transitions.
//!
//! Downgrades (`rw → ro`, `ro → ar`, `rw → ar`) are unconditional;
//! upgrades reverse those edges and require explicit confirmation. Every
//! other pair, including self-transitions, is rejected.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use artstore_model::{OperatingMode, OperationKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::blob::TMP_SUFFIX;
use crate::error::{StoreError, StoreResult};

/// Name of the persisted mode marker inside the data directory. Dot-prefixed
/// so blob and sidecar scans skip it.
const MODE_MARKER: &str = ".mode";

/// Successful transition record returned to the caller.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModeTransition {
    /// Mode before the transition.
    pub previous_mode: OperatingMode,
    /// Mode after the transition.
    pub current_mode: OperatingMode,
    /// Instant the transition was applied.
    pub transitioned_at: DateTime<Utc>,
}

/// Resolve the startup mode from the persisted marker, falling back to the
/// configured default.
///
/// The marker, when present and parseable, wins over the config default: it
/// records the last operator-confirmed transition. Both values are logged so
/// a stale marker stays visible.
#[must_use]
pub fn load_initial_mode(data_dir: &Path, default: OperatingMode) -> OperatingMode {
    let marker = data_dir.join(MODE_MARKER);
    match std::fs::read_to_string(&marker) {
        Ok(raw) => match raw.trim().parse::<OperatingMode>() {
            Ok(persisted) => {
                info!(
                    persisted = %persisted,
                    config_default = %default,
                    "restoring operating mode from marker"
                );
                persisted
            }
            Err(_) => {
                warn!(
                    path = %marker.display(),
                    value = raw.trim(),
                    config_default = %default,
                    "ignoring unparseable mode marker"
                );
                default
            }
        },
        Err(_) => default,
    }
}

/// Mutex-guarded operating mode with an optional persisted marker.
#[derive(Debug)]
pub struct ModeMachine {
    current: Mutex<OperatingMode>,
    marker: Option<PathBuf>,
}

impl ModeMachine {
    /// Create the machine in `initial` mode. When `marker_dir` is set (the
    /// replicated deployment case) every successful transition is persisted
    /// to the `.mode` marker inside it.
    #[must_use]
    pub fn new(initial: OperatingMode, marker_dir: Option<&Path>) -> Self {
        Self {
            current: Mutex::new(initial),
            marker: marker_dir.map(|dir| dir.join(MODE_MARKER)),
        }
    }

    /// Current operating mode.
    #[must_use]
    pub fn current(&self) -> OperatingMode {
        *self.lock()
    }

    /// Whether `operation` is admitted in the current mode.
    #[must_use]
    pub fn can_perform(&self, operation: OperationKind) -> bool {
        self.current().allows(operation)
    }

    /// Apply a transition to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTransition`] for undefined pairs and
    /// [`StoreError::ConfirmationRequired`] for upgrade edges taken without
    /// the confirm flag.
    pub fn transition_to(
        &self,
        target: OperatingMode,
        confirm: bool,
        subject: &str,
    ) -> StoreResult<ModeTransition> {
        let mut current = self.lock();
        let from = *current;
        match classify_edge(from, target) {
            Edge::Undefined => {
                return Err(StoreError::InvalidTransition { from, to: target });
            }
            Edge::Upgrade if !confirm => {
                return Err(StoreError::ConfirmationRequired { from, to: target });
            }
            Edge::Downgrade | Edge::Upgrade => {}
        }

        *current = target;
        drop(current);

        let transitioned_at = Utc::now();
        info!(
            from = %from,
            to = %target,
            subject = subject,
            timestamp = %transitioned_at,
            "operating mode transition applied"
        );
        self.persist_marker(target);

        Ok(ModeTransition {
            previous_mode: from,
            current_mode: target,
            transitioned_at,
        })
    }

    fn persist_marker(&self, mode: OperatingMode) {
        let Some(marker) = &self.marker else {
            return;
        };
        let tmp = marker.with_file_name(format!("{MODE_MARKER}{TMP_SUFFIX}"));
        let result = std::fs::write(&tmp, mode.as_str())
            .and_then(|()| std::fs::rename(&tmp, marker));
        if let Err(err) = result {
            warn!(
                path = %marker.display(),
                error = %err,
                "failed to persist mode marker"
            );
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OperatingMode> {
        self.current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

enum Edge {
    Downgrade,
    Upgrade,
    Undefined,
}

const fn classify_edge(from: OperatingMode, to: OperatingMode) -> Edge {
    use OperatingMode::{Ar, Ro, Rw};
    match (from, to) {
        (Rw, Ro | Ar) | (Ro, Ar) => Edge::Downgrade,
        (Ro, Rw) | (Ar, Ro | Rw) => Edge::Upgrade,
        (Rw, Rw) | (Ro, Ro) | (Ar, Ar) => Edge::Undefined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    const MODES: [OperatingMode; 3] =
        [OperatingMode::Rw, OperatingMode::Ro, OperatingMode::Ar];

    fn is_downgrade(from: OperatingMode, to: OperatingMode) -> bool {
        matches!(
            (from, to),
            (OperatingMode::Rw, OperatingMode::Ro | OperatingMode::Ar)
                | (OperatingMode::Ro, OperatingMode::Ar)
        )
    }

    #[test]
    fn confirm_true_accepts_exactly_the_defined_edges() {
        for from in MODES {
            for to in MODES {
                let machine = ModeMachine::new(from, None);
                let result = machine.transition_to(to, true, "tester");
                if from == to {
                    assert!(result.is_err(), "{from} -> {to} must be rejected");
                } else {
                    assert!(result.is_ok(), "{from} -> {to} must be accepted");
                }
            }
        }
    }

    #[test]
    fn confirm_false_additionally_rejects_upgrades() {
        for from in MODES {
            for to in MODES {
                let machine = ModeMachine::new(from, None);
                let result = machine.transition_to(to, false, "tester");
                if is_downgrade(from, to) {
                    assert!(result.is_ok(), "downgrade {from} -> {to} needs no confirm");
                } else if from == to {
                    assert!(matches!(
                        result,
                        Err(StoreError::InvalidTransition { .. })
                    ));
                } else {
                    assert!(
                        matches!(result, Err(StoreError::ConfirmationRequired { .. })),
                        "upgrade {from} -> {to} must demand confirmation"
                    );
                }
            }
        }
    }

    #[test]
    fn transition_reports_previous_and_current() {
        let machine = ModeMachine::new(OperatingMode::Rw, None);
        let record = machine
            .transition_to(OperatingMode::Ro, false, "tester")
            .expect("downgrade");
        assert_eq!(record.previous_mode, OperatingMode::Rw);
        assert_eq!(record.current_mode, OperatingMode::Ro);
        assert_eq!(machine.current(), OperatingMode::Ro);
        assert!(!machine.can_perform(OperationKind::Upload));
        assert!(machine.can_perform(OperationKind::Download));
    }

    #[test]
    fn marker_round_trips_through_startup() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::Builder::new()
            .prefix("artstore-mode-")
            .tempdir()?;
        let machine = ModeMachine::new(OperatingMode::Rw, Some(dir.path()));
        machine
            .transition_to(OperatingMode::Ar, false, "tester")
            .expect("downgrade");

        let restored = load_initial_mode(dir.path(), OperatingMode::Rw);
        assert_eq!(restored, OperatingMode::Ar);
        Ok(())
    }

    #[test]
    fn unparseable_marker_falls_back_to_default() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::Builder::new()
            .prefix("artstore-mode-")
            .tempdir()?;
        std::fs::write(dir.path().join(".mode"), "sideways")?;
        assert_eq!(
            load_initial_mode(dir.path(), OperatingMode::Ro),
            OperatingMode::Ro
        );
        Ok(())
    }
}
