use crate::models::FileTable;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Outbound command telling the browser widget to clear itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResetCommand {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "inputId")]
    pub input_id: String,
}

impl ResetCommand {
    pub const KIND: &'static str = "uppy-reset";

    pub fn new(input_id: impl Into<String>) -> Self {
        Self {
            kind: Self::KIND.to_string(),
            input_id: input_id.into(),
        }
    }
}

/// Current value of one input plus the values it replaced. Replaced files
/// stay owned by the session until it ends.
#[derive(Default)]
struct InputSlot {
    current: FileTable,
    retired: Vec<FileTable>,
}

impl InputSlot {
    fn retire_current(&mut self) {
        let previous = std::mem::take(&mut self.current);
        if !previous.is_empty() {
            self.retired.push(previous);
        }
    }

    async fn delete_files(self) -> usize {
        let mut removed = self.current.delete_files().await;
        for table in &self.retired {
            removed += table.delete_files().await;
        }
        removed
    }
}

/// Current value of every upload input, per session.
#[derive(Default)]
pub struct SessionStore {
    values: DashMap<(String, String), InputSlot>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the value of an input. The replaced files are deleted when
    /// the session ends.
    pub fn publish(&self, session_id: &str, input_id: &str, table: FileTable) {
        tracing::debug!(
            "Publishing {} row(s) to {}/{}",
            table.len(),
            session_id,
            input_id
        );
        let mut slot = self
            .values
            .entry((session_id.to_string(), input_id.to_string()))
            .or_default();
        slot.retire_current();
        slot.current = table;
    }

    /// Value as seen by application code; zero rows if nothing was published.
    pub fn value(&self, session_id: &str, input_id: &str) -> FileTable {
        self.values
            .get(&(session_id.to_string(), input_id.to_string()))
            .map(|slot| slot.current.clone())
            .unwrap_or_default()
    }

    /// Clears the server-side value and returns the command that clears the
    /// widget. With `purge`, the files behind the old value are deleted now;
    /// otherwise they are kept until the session ends.
    pub async fn reset(&self, session_id: &str, input_id: &str, purge: bool) -> ResetCommand {
        let previous = {
            let mut slot = self
                .values
                .entry((session_id.to_string(), input_id.to_string()))
                .or_default();
            if purge {
                std::mem::take(&mut slot.current)
            } else {
                slot.retire_current();
                FileTable::empty()
            }
        };

        if !previous.is_empty() {
            let removed = previous.delete_files().await;
            tracing::info!(
                "Reset {}/{}: deleted {} file(s)",
                session_id,
                input_id,
                removed
            );
        }

        ResetCommand::new(input_id)
    }

    /// Drops every value of a session, including replaced ones, and deletes
    /// their files. Returns the number of deleted files.
    pub async fn end_session(&self, session_id: &str) -> usize {
        let keys: Vec<(String, String)> = self
            .values
            .iter()
            .filter(|entry| entry.key().0 == session_id)
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in keys {
            if let Some((_, slot)) = self.values.remove(&key) {
                removed += slot.delete_files().await;
            }
        }
        tracing::info!("Session {} ended, {} file(s) deleted", session_id, removed);
        removed
    }

    /// Number of (session, input) pairs holding a value.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
