use serde::{Deserialize, Serialize};

use super::{Booking, MechanicApplication};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Repairs,
    #[serde(rename = "apply_to_be_a_mechanic")]
    MechanicApplications,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Repairs => "repairs",
            Table::MechanicApplications => "apply_to_be_a_mechanic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "repairs" => Some(Table::Repairs),
            "apply_to_be_a_mechanic" => Some(Table::MechanicApplications),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Row {
    Repair(Box<Booking>),
    MechanicApplication(Box<MechanicApplication>),
}

impl Row {
    pub fn table(&self) -> Table {
        match self {
            Row::Repair(_) => Table::Repairs,
            Row::MechanicApplication(_) => Table::MechanicApplications,
        }
    }

    /// Column value used by realtime filters. `Some(None)` means the column
    /// exists and is null; `None` means the column is unknown for this table.
    pub fn column(&self, name: &str) -> Option<Option<&str>> {
        match (self, name) {
            (Row::Repair(b), "id") => Some(Some(&b.id)),
            (Row::Repair(b), "user_id") => Some(Some(&b.user_id)),
            (Row::Repair(b), "mechanic_id") => Some(b.mechanic_id.as_deref()),
            (Row::Repair(b), "status") => Some(Some(b.status.as_str())),
            (Row::MechanicApplication(a), "id") => Some(Some(&a.id)),
            (Row::MechanicApplication(a), "user_id") => Some(Some(&a.user_id)),
            _ => None,
        }
    }
}

/// A single row change, delivered to realtime subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEvent {
    pub table: Table,
    #[serde(rename = "eventType")]
    pub kind: ChangeKind,
    pub old: Option<Row>,
    pub new: Option<Row>,
}

impl ChangeEvent {
    pub fn inserted(row: Row) -> Self {
        Self {
            table: row.table(),
            kind: ChangeKind::Insert,
            old: None,
            new: Some(row),
        }
    }

    pub fn updated(old: Row, new: Row) -> Self {
        Self {
            table: new.table(),
            kind: ChangeKind::Update,
            old: Some(old),
            new: Some(new),
        }
    }

    pub fn deleted(row: Row) -> Self {
        Self {
            table: row.table(),
            kind: ChangeKind::Delete,
            old: Some(row),
            new: None,
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.new.iter().chain(self.old.iter())
    }
}
