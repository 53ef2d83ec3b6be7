use serde::{Deserialize, Serialize};

use crate::domain::{Event, EventRecord};

/// Describes what changes were detected between stored and incoming state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub changed_fields: Vec<FieldChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl ChangeSet {
    pub fn no_changes() -> Self {
        Self::default()
    }

    pub fn add_change(
        &mut self,
        field_name: &str,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.changed_fields.push(FieldChange {
            field_name: field_name.to_string(),
            old_value,
            new_value,
        });
    }

    pub fn has_changes(&self) -> bool {
        !self.changed_fields.is_empty()
    }

    /// Used as the revision log message.
    pub fn summarize(&self) -> String {
        if !self.has_changes() {
            return "No field changes".to_string();
        }
        let fields: Vec<&str> = self
            .changed_fields
            .iter()
            .map(|f| f.field_name.as_str())
            .collect();
        format!("Updated event: {}", fields.join(", "))
    }

    /// Compare the fields a re-sync overwrites. URL and venue are not
    /// carried over on update, so they are not compared.
    pub fn for_event(current: &Event, incoming: &EventRecord) -> Self {
        let mut changeset = Self::no_changes();

        if current.title != incoming.name {
            changeset.add_change(
                "title",
                Some(current.title.clone()),
                Some(incoming.name.clone()),
            );
        }

        if current.description != incoming.description {
            changeset.add_change(
                "description",
                Some(current.description.clone()),
                Some(incoming.description.clone()),
            );
        }

        if current.event_date != incoming.event_date {
            changeset.add_change(
                "event_date",
                current.event_date.map(|d| d.to_string()),
                incoming.event_date.map(|d| d.to_string()),
            );
        }

        changeset
    }
}
