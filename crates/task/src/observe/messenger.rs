//! Destinations for provenance messages

use cairn_core::audit::gen_uid;
use cairn_core::{AuditMessage, Error, Result};
use cairn_utils::write_json_atomic;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Receives every provenance message a task emits
pub trait Messenger: Send + Sync + fmt::Debug {
    fn send(&self, message: &AuditMessage) -> Result<()>;
}

/// Logs each message as a structured `tracing` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMessenger;

impl Messenger for TracingMessenger {
    fn send(&self, message: &AuditMessage) -> Result<()> {
        let body = serde_json::to_string(message.as_map())?;
        tracing::info!(
            id = message.id().unwrap_or_default(),
            kind = message.kind().unwrap_or_default(),
            message = %body,
            "provenance"
        );
        Ok(())
    }
}

/// Writes one `<id>.jsonld` file per message id
///
/// A later message with an id already on disk is merged into that file,
/// so the start and end of an activity end up in one document.
#[derive(Debug, Clone)]
pub struct FileMessenger {
    message_dir: PathBuf,
}

impl FileMessenger {
    pub fn new(message_dir: impl Into<PathBuf>) -> Self {
        Self {
            message_dir: message_dir.into(),
        }
    }

    pub fn message_dir(&self) -> &Path {
        &self.message_dir
    }
}

impl Messenger for FileMessenger {
    fn send(&self, message: &AuditMessage) -> Result<()> {
        fs::create_dir_all(&self.message_dir)
            .map_err(|e| Error::file_system(&self.message_dir, "create message directory", e))?;

        // generation records carry no @id of their own
        let id = message.id().map(str::to_string).unwrap_or_else(gen_uid);
        let file_name: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();

        let path = self.message_dir.join(format!("{file_name}.jsonld"));
        let mut document = match fs::read_to_string(&path) {
            Ok(existing) => serde_json::from_str::<Map<String, Value>>(&existing)
                .map_err(|e| Error::json(format!("invalid message file {}", path.display()), e))?,
            Err(_) => Map::new(),
        };
        document.extend(message.as_map().clone());
        write_json_atomic(&path, &document)
    }
}

/// Keeps messages in memory, mostly for inspection in tests
#[derive(Debug, Default)]
pub struct RecordingMessenger {
    messages: Mutex<Vec<AuditMessage>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<AuditMessage> {
        self.messages.lock().clone()
    }
}

impl Messenger for RecordingMessenger {
    fn send(&self, message: &AuditMessage) -> Result<()> {
        self.messages.lock().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_messenger_writes_one_file_per_message() {
        let temp_dir = TempDir::new().unwrap();
        let messenger = FileMessenger::new(temp_dir.path().join("messages"));

        messenger
            .send(&AuditMessage::new("uid:1234").with("@type", "task"))
            .unwrap();
        messenger
            .send(&AuditMessage::typed("prov:Generation"))
            .unwrap();

        let mut names: Vec<String> = fs::read_dir(messenger.message_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"uid_1234.jsonld".to_string()));
        assert!(names.iter().all(|name| name.ends_with(".jsonld")));

        let content = fs::read_to_string(messenger.message_dir().join("uid_1234.jsonld")).unwrap();
        let value: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["@type"], "task");
    }

    #[test]
    fn test_file_messenger_merges_same_id() {
        let temp_dir = TempDir::new().unwrap();
        let messenger = FileMessenger::new(temp_dir.path());

        messenger
            .send(&AuditMessage::new("uid:1").with("startedAtTime", "t0"))
            .unwrap();
        messenger
            .send(&AuditMessage::new("uid:1").with("endedAtTime", "t1"))
            .unwrap();

        let content = fs::read_to_string(temp_dir.path().join("uid_1.jsonld")).unwrap();
        let value: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["startedAtTime"], "t0");
        assert_eq!(value["endedAtTime"], "t1");
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_recording_messenger_keeps_order() {
        let messenger = RecordingMessenger::new();
        messenger.send(&AuditMessage::new("a")).unwrap();
        messenger.send(&AuditMessage::new("b")).unwrap();
        let ids: Vec<_> = messenger
            .messages()
            .iter()
            .map(|m| m.id().unwrap().to_string())
            .collect();
        assert_eq!(ids, ["a", "b"]);
    }
}
