use serde::{Deserialize, Serialize};

/// What the classifier asks to happen to a detail record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePurgeAction {
    Add,
    Update,
    Delete,
    #[default]
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePurgeMode {
    /// Report dispositions to per-action files; the master index is untouched.
    #[default]
    Passive,
    /// Apply dispositions to the master index.
    Active,
}

/// Scratch value for one detail record, handed to the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePurgeParam {
    pub detail_fields: Vec<String>,
    /// Fields of the matching master record. For an add or update the
    /// classifier may replace these with the fields of the new master record.
    pub master_fields: Option<Vec<String>>,
    pub key_found: bool,
    pub action: MergePurgeAction,
}

impl MergePurgeParam {
    pub fn new(detail_fields: Vec<String>, master_fields: Option<Vec<String>>) -> Self {
        Self {
            key_found: master_fields.is_some(),
            detail_fields,
            master_fields,
            action: MergePurgeAction::Ignore,
        }
    }

    /// The action that actually applies: add only when the key is new,
    /// update and delete only when it exists.
    pub fn effective_action(&self) -> MergePurgeAction {
        match (self.action, self.key_found) {
            (MergePurgeAction::Add, false) => MergePurgeAction::Add,
            (MergePurgeAction::Update, true) => MergePurgeAction::Update,
            (MergePurgeAction::Delete, true) => MergePurgeAction::Delete,
            _ => MergePurgeAction::Ignore,
        }
    }

    pub fn is_honoured(&self) -> bool {
        self.action == self.effective_action()
    }

    /// Fields that make up the new master record for an add or update.
    pub fn into_master_record(self) -> Vec<String> {
        self.master_fields.unwrap_or(self.detail_fields)
    }
}
