//! Reminders.app adapter
//!
//! Reminder rows use the tabular layout (tab between fields, one reminder
//! per line).

use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::info;

use super::require_text;
use crate::bridge::Bridge;
use crate::bridge::escape::quote;
use crate::bridge::records::{
    FIELD_SEP, Field, NEWLINE, RECORD_SEP, Record, RecordSchema, TAB,
};
use crate::bridge::script::{Create, Filter, Locate, Properties, Query, Script, Value};
use crate::error::{BridgeError, Result};
use crate::types::{Reminder, ReminderList};

const APP: &str = "Reminders";

static LISTS: RecordSchema = RecordSchema {
    name: "reminder_list",
    record_sep: RECORD_SEP,
    field_sep: FIELD_SEP,
    min_fields: 2,
    fields: &[
        Field::text("id", "id of rec"),
        Field::text("name", "name of rec"),
    ],
};

static REMINDERS: RecordSchema = RecordSchema {
    name: "reminder",
    record_sep: NEWLINE,
    field_sep: TAB,
    min_fields: 4,
    fields: &[
        Field::text("name", "name of rec"),
        Field::text("completed", "completed of rec"),
        Field::text("priority", "priority of rec"),
        Field::date("due", "due date of rec"),
        Field::text("notes", "body of rec"),
        Field::text("id", "id of rec"),
    ],
};

#[derive(Debug, Clone, Default)]
pub struct NewReminder {
    pub name: String,
    /// Default list when `None`
    pub list: Option<String>,
    pub due: Option<NaiveDateTime>,
    pub notes: Option<String>,
    /// 0 none, 1-4 high, 5 medium, 6-9 low
    pub priority: Option<i64>,
}

pub struct Reminders {
    bridge: Arc<Bridge>,
}

impl Reminders {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }

    pub async fn list_lists(&self) -> Result<Vec<ReminderList>> {
        self.bridge.check_platform()?;
        let mut script = Script::tell(APP);
        script.query(&Query::new("lists"), &LISTS);
        let records = self.bridge.fetch(&script.build(), &LISTS).await?;
        Ok(records
            .iter()
            .map(|r| ReminderList {
                id: r.text("id"),
                name: r.text("name"),
            })
            .collect())
    }

    pub async fn list(
        &self,
        list: Option<&str>,
        include_completed: bool,
        limit: Option<usize>,
    ) -> Result<Vec<Reminder>> {
        self.bridge.check_platform()?;
        let source = match list.filter(|l| !l.is_empty()) {
            Some(l) => format!("reminders of list {}", quote(l)),
            None => "reminders".to_string(),
        };
        let filter =
            (!include_completed).then(|| Filter::equals("completed", Value::Bool(false)));
        let mut query = Query::new(source).filter(filter);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        let mut script = Script::tell(APP);
        script.query(&query, &REMINDERS);
        let records = self.bridge.fetch(&script.build(), &REMINDERS).await?;
        records.iter().map(map_reminder).collect()
    }

    pub async fn create(&self, reminder: &NewReminder) -> Result<Reminder> {
        self.bridge.check_platform()?;
        require_text(&reminder.name, "Reminder name")?;
        if let Some(p) = reminder.priority {
            if !(0..=9).contains(&p) {
                return Err(BridgeError::invalid_input(format!(
                    "Priority must be between 0 and 9, got {}",
                    p
                )));
            }
        }

        let props = Properties::new()
            .text("name", &reminder.name)
            .opt_text("body", reminder.notes.as_deref())
            .opt_date("due date", reminder.due)
            .opt_int("priority", reminder.priority);
        let mut create = Create::new("reminder", props);
        if let Some(l) = reminder.list.as_deref().filter(|l| !l.is_empty()) {
            create = create.at(format!("list {}", quote(l)));
        }

        let mut script = Script::tell(APP);
        script.create(&create).returning(&REMINDERS);
        let record = self.bridge.fetch_one(&script.build(), &REMINDERS).await?;
        let created = map_reminder(&record)?;
        info!("Created reminder '{}'", created.name);
        Ok(created)
    }

    /// Mark a reminder completed or not
    pub async fn complete(&self, id: &str, completed: bool) -> Result<Reminder> {
        self.bridge.check_platform()?;
        require_text(id, "Reminder id")?;
        let mut script = Script::tell(APP);
        script
            .locate(&find_reminder(id))
            .assign(&Properties::new().set("completed", Value::Bool(completed)))
            .returning(&REMINDERS);
        let record = self.bridge.fetch_one(&script.build(), &REMINDERS).await?;
        map_reminder(&record)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.bridge.check_platform()?;
        require_text(id, "Reminder id")?;
        let mut script = Script::tell(APP);
        script
            .locate(&find_reminder(id))
            .line("delete rec")
            .returning_nothing();
        self.bridge.run(&script.build()).await?;
        info!("Deleted reminder {}", id);
        Ok(())
    }
}

fn find_reminder(id: &str) -> Locate {
    Locate::new(
        "reminders",
        Filter::equals("id", Value::text(id)),
        format!("Reminder {}", id),
    )
}

fn map_reminder(r: &Record) -> Result<Reminder> {
    Ok(Reminder {
        id: r.text("id"),
        name: r.text("name"),
        completed: r.bool("completed")?,
        priority: r.int("priority")?,
        due_date: r.date("due")?,
        notes: r.text("notes"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::{ok, stub_bridge};
    use crate::error::ErrorKind;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn test_list_decodes_tabular_rows() {
        let (bridge, runner) = stub_bridge(vec![ok("Buy milk\tfalse\t0\t\tx\n")]);
        let reminders = Reminders::new(bridge).list(None, false, None).await.unwrap();
        assert_eq!(
            reminders,
            vec![Reminder {
                id: String::new(),
                name: "Buy milk".into(),
                completed: false,
                priority: 0,
                due_date: None,
                notes: "x".into(),
            }]
        );
        let src = runner.last_source();
        assert!(src.contains("set theItems to (reminders whose completed is false)"));
        assert!(src.contains("set rowText to rowText & fieldValue & tab"));
        assert!(src.contains("set output to output & rowText & linefeed"));
    }

    #[tokio::test]
    async fn test_short_rows_are_dropped() {
        let payload = "Call Bob\ttrue\t1\t2024-06-01T09%3A00%3A00\t\tR1\nbroken\ttrue\n";
        let (bridge, _) = stub_bridge(vec![ok(payload)]);
        let reminders = Reminders::new(bridge)
            .list(Some("Work"), true, Some(5))
            .await
            .unwrap();
        assert_eq!(reminders.len(), 1);
        assert!(reminders[0].completed);
        assert_eq!(
            reminders[0].due_date,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(9, 0, 0)
        );
    }

    #[tokio::test]
    async fn test_non_boolean_completed_is_decode_failure() {
        let (bridge, _) = stub_bridge(vec![ok("Buy milk\tmaybe\t0\t\tnote\n")]);
        let err = Reminders::new(bridge).list(None, true, None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::DecodeFailed);
    }

    #[tokio::test]
    async fn test_create_in_list() {
        let (bridge, runner) = stub_bridge(vec![ok("Pay rent\tfalse\t1\t\t\tR9\n")]);
        let reminder = NewReminder {
            name: "Pay rent".into(),
            list: Some("Home".into()),
            priority: Some(1),
            ..Default::default()
        };
        let created = Reminders::new(bridge).create(&reminder).await.unwrap();
        assert_eq!(created.id, "R9");
        assert!(runner.last_source().contains(
            r#"make new reminder at list "Home" with properties {name:"Pay rent", priority:1}"#
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_priority() {
        let (bridge, runner) = stub_bridge(vec![]);
        let reminder = NewReminder {
            name: "x".into(),
            priority: Some(12),
            ..Default::default()
        };
        let err = Reminders::new(bridge).create(&reminder).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert_eq!(runner.invocations(), 0);
    }

    #[tokio::test]
    async fn test_complete() {
        let (bridge, runner) = stub_bridge(vec![ok("Pay rent\ttrue\t1\t\t\tR9\n")]);
        let done = Reminders::new(bridge).complete("R9", true).await.unwrap();
        assert!(done.completed);
        assert!(runner.last_source().contains("set completed of rec to true"));
    }

    #[tokio::test]
    async fn test_not_running() {
        let (bridge, _) = stub_bridge(vec![crate::bridge::runner::BridgeResult::failure(
            "exit status: 1",
            "Application isn't running (-600)",
        )]);
        let err = Reminders::new(bridge).list_lists().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ApplicationNotRunning);
    }
}
