//! Domain objects returned by the application adapters

use chrono::NaiveDateTime;
use serde::Serialize;

/// One entry of a labeled multi-value property (a contact's emails, say)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabeledValue {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarInfo {
    pub name: String,
    pub writable: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub uid: String,
    pub calendar: String,
    pub title: String,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub all_day: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub location: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mailbox {
    pub name: String,
    pub account: String,
    pub unread: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: i64,
    pub mailbox: String,
    pub account: String,
    pub subject: String,
    pub sender: String,
    pub received: Option<NaiveDateTime>,
    pub read: bool,
    pub flagged: bool,
    /// Plain text; only populated when a single message is read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub first_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub organization: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub note: String,
    pub emails: Vec<LabeledValue>,
    pub phones: Vec<LabeledValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactGroup {
    pub id: String,
    pub name: String,
    pub members: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteFolder {
    pub id: String,
    pub name: String,
    pub account: String,
    pub notes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub folder: String,
    /// Plain text, normalized from the note's HTML body
    pub body: String,
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReminderList {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reminder {
    pub id: String,
    pub name: String,
    pub completed: bool,
    /// 0 none, 1 high, 5 medium, 9 low
    pub priority: i64,
    pub due_date: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub path: String,
    pub kind: String,
    pub is_directory: bool,
    pub size: Option<u64>,
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tab {
    /// `<browser>:<window>:<tab>`
    pub id: String,
    pub window_index: u32,
    pub tab_index: u32,
    pub title: String,
    pub url: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bookmark {
    pub title: String,
    pub url: String,
    /// Slash-separated folder path
    pub folder: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryItem {
    pub title: String,
    pub url: String,
    pub visited_at: Option<NaiveDateTime>,
    pub visit_count: i64,
}
