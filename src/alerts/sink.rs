use crate::alerts::AlertEvent;
use crate::error::AlertError;
use crate::records::Severity;
use log::{debug, info, warn};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Destination for alert transitions
///
/// Sinks are called once when an event is raised and once when it resolves.
/// Delivery failures are reported back but never retried.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &AlertEvent) -> Result<(), AlertError>;
}

/// Writes alerts through the log facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, event: &AlertEvent) -> Result<(), AlertError> {
        if event.resolved {
            info!("Resolved: {}", event);
        } else if event.severity == Severity::High {
            warn!("{}", event);
        } else {
            info!("{}", event);
        }
        Ok(())
    }
}

/// Appends every alert transition to a JSON-lines file
///
/// Raised and resolved events are both written, so the file is a complete
/// history that survives restarts. The file is created on first write.
#[derive(Debug)]
pub struct AlertLogSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AlertLogSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NotificationSink for AlertLogSink {
    fn notify(&self, event: &AlertEvent) -> Result<(), AlertError> {
        let line = serde_json::to_string(event)
            .map_err(|e| AlertError::NotificationFailed(format!("encode alert {}: {}", event.id, e)))?;

        let _guard = self
            .lock
            .lock()
            .map_err(|_| AlertError::NotificationFailed("alert log lock poisoned".to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                AlertError::NotificationFailed(format!("{}: {}", self.path.display(), e))
            })?;
        writeln!(file, "{}", line).map_err(|e| {
            AlertError::NotificationFailed(format!("{}: {}", self.path.display(), e))
        })?;

        debug!("Appended alert {} to {}", event.id, self.path.display());
        Ok(())
    }
}
