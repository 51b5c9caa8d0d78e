//! Calendar.app adapter

use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::info;

use super::require_text;
use crate::bridge::Bridge;
use crate::bridge::escape::quote;
use crate::bridge::records::{FIELD_SEP, Field, RECORD_SEP, Record, RecordSchema};
use crate::bridge::script::{Create, Filter, Locate, Properties, Query, Script, Value};
use crate::error::{BridgeError, Result};
use crate::types::{CalendarInfo, Event};

const APP: &str = "Calendar";

static CALENDARS: RecordSchema = RecordSchema {
    name: "calendar",
    record_sep: RECORD_SEP,
    field_sep: FIELD_SEP,
    min_fields: 2,
    fields: &[
        Field::text("name", "name of rec"),
        Field::text("writable", "writable of rec"),
        Field::text("description", "description of rec"),
    ],
};

/// `cal` is the calendar the event was found in
static EVENTS: RecordSchema = RecordSchema {
    name: "event",
    record_sep: RECORD_SEP,
    field_sep: FIELD_SEP,
    min_fields: 6,
    fields: &[
        Field::text("uid", "uid of rec"),
        Field::text("calendar", "name of cal"),
        Field::text("title", "summary of rec"),
        Field::date("start", "start date of rec"),
        Field::date("end", "end date of rec"),
        Field::text("all_day", "allday event of rec"),
        Field::text("location", "location of rec"),
        Field::text("notes", "description of rec"),
        Field::text("url", "url of rec"),
    ],
};

#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Restrict to one calendar; every calendar when `None`
    pub calendar: Option<String>,
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
    /// Substring of the event title
    pub search: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    /// First writable calendar when `None`
    pub calendar: Option<String>,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub all_day: bool,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EventChanges {
    pub title: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

impl EventChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.location.is_none()
            && self.notes.is_none()
    }
}

pub struct Calendar {
    bridge: Arc<Bridge>,
}

impl Calendar {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }

    pub async fn list_calendars(&self) -> Result<Vec<CalendarInfo>> {
        self.bridge.check_platform()?;
        let mut script = Script::tell(APP);
        script.query(&Query::new("calendars"), &CALENDARS);
        let records = self.bridge.fetch(&script.build(), &CALENDARS).await?;
        records
            .iter()
            .map(|r| {
                Ok(CalendarInfo {
                    name: r.text("name"),
                    writable: r.bool("writable")?,
                    description: r.text("description"),
                })
            })
            .collect()
    }

    pub async fn list_events(&self, query: &EventQuery) -> Result<Vec<Event>> {
        self.bridge.check_platform()?;
        if let (Some(from), Some(to)) = (query.from, query.to) {
            if to < from {
                return Err(BridgeError::invalid_input(
                    "End of the range is before its start",
                ));
            }
        }

        let filter = Filter::all(
            [
                query.from.map(|d| Filter::AtLeast("start date", Value::Date(d))),
                query.to.map(|d| Filter::AtMost("start date", Value::Date(d))),
                query
                    .search
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .map(|s| Filter::contains("summary", s)),
            ]
            .into_iter()
            .flatten(),
        );

        let mut script = Script::tell(APP);
        let calendars = match query.calendar.as_deref() {
            Some(name) => {
                let named = format!("calendars whose name is {}", quote(name));
                script.line(format!(
                    "if (count of ({})) = 0 then error {} number -1728",
                    named,
                    quote(&format!("Calendar {} not found", name))
                ));
                named
            }
            None => "calendars".to_string(),
        };
        script.query(
            &Query::new("events of cal")
                .filter(filter)
                .within(calendars, "cal"),
            &EVENTS,
        );

        let records = self.bridge.fetch(&script.build(), &EVENTS).await?;
        let mut events = records.iter().map(map_event).collect::<Result<Vec<_>>>()?;
        // calendars are walked one after another, so the limit applies to the sorted set
        events.sort_by_key(|e| e.start);
        if let Some(limit) = query.limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    pub async fn create_event(&self, event: &NewEvent) -> Result<Event> {
        self.bridge.check_platform()?;
        require_text(&event.title, "Event title")?;
        if event.end < event.start {
            return Err(BridgeError::invalid_input(format!(
                "Event ends ({}) before it starts ({})",
                event.end, event.start
            )));
        }

        let mut script = Script::tell(APP);
        script.locate(&target_calendar(event.calendar.as_deref()));
        script.line("set cal to rec");

        let mut props = Properties::new()
            .text("summary", &event.title)
            .set("start date", Value::Date(event.start))
            .set("end date", Value::Date(event.end))
            .opt_text("location", event.location.as_deref())
            .opt_text("description", event.notes.as_deref())
            .opt_text("url", event.url.as_deref());
        if event.all_day {
            props = props.set("allday event", Value::Bool(true));
        }
        script
            .create(&Create::new("event", props).at("end of events of cal"))
            .returning(&EVENTS);

        let record = self.bridge.fetch_one(&script.build(), &EVENTS).await?;
        let created = map_event(&record)?;
        info!("Created event '{}' in {}", created.title, created.calendar);
        Ok(created)
    }

    pub async fn update_event(&self, uid: &str, changes: &EventChanges) -> Result<Event> {
        self.bridge.check_platform()?;
        require_text(uid, "Event id")?;
        if changes.is_empty() {
            return Err(BridgeError::invalid_input("No changes given for event"));
        }
        if let (Some(start), Some(end)) = (changes.start, changes.end) {
            if end < start {
                return Err(BridgeError::invalid_input("Event ends before it starts"));
            }
        }

        let props = Properties::new()
            .opt_text("summary", changes.title.as_deref())
            .opt_date("start date", changes.start)
            .opt_date("end date", changes.end)
            .set_opt_text("location", changes.location.as_deref())
            .set_opt_text("description", changes.notes.as_deref());

        let mut script = Script::tell(APP);
        script
            .locate(&find_event(uid))
            .assign(&props)
            .returning(&EVENTS);
        let record = self.bridge.fetch_one(&script.build(), &EVENTS).await?;
        map_event(&record)
    }

    pub async fn delete_event(&self, uid: &str) -> Result<()> {
        self.bridge.check_platform()?;
        require_text(uid, "Event id")?;
        let mut script = Script::tell(APP);
        script.locate(&find_event(uid)).line("delete rec");
        script.returning_nothing();
        self.bridge.run(&script.build()).await?;
        info!("Deleted event {}", uid);
        Ok(())
    }
}

fn target_calendar(name: Option<&str>) -> Locate {
    match name {
        Some(name) => Locate::new(
            "calendars",
            Filter::equals("name", Value::text(name)),
            format!("Calendar {}", name),
        ),
        None => Locate::new(
            "calendars",
            Filter::equals("writable", Value::Bool(true)),
            "Writable calendar",
        ),
    }
}

fn find_event(uid: &str) -> Locate {
    Locate::new(
        "events of cal",
        Filter::equals("uid", Value::text(uid)),
        format!("Event {}", uid),
    )
    .within("calendars", "cal")
}

fn map_event(r: &Record) -> Result<Event> {
    Ok(Event {
        uid: r.text("uid"),
        calendar: r.text("calendar"),
        title: r.text("title"),
        start: r.date("start")?,
        end: r.date("end")?,
        all_day: r.bool("all_day")?,
        location: r.text("location"),
        notes: r.text("notes"),
        url: r.text("url"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::{ok, stub_bridge};
    use crate::error::ErrorKind;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 20)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_calendars() {
        let (bridge, _) = stub_bridge(vec![ok("Home|||true|||:::Holidays|||false|||Public holidays:::")]);
        let cals = Calendar::new(bridge).list_calendars().await.unwrap();
        assert_eq!(cals.len(), 2);
        assert!(cals[0].writable);
        assert_eq!(cals[1].description, "Public holidays");
    }

    #[tokio::test]
    async fn test_list_events_sorted_and_filtered() {
        let payload = "B1|||Work|||Review|||2024-05-20T14%3A00%3A00|||2024-05-20T15%3A00%3A00|||false|||||||||:::\
                       A1|||Home|||Standup|||2024-05-20T09%3A00%3A00|||2024-05-20T09%3A15%3A00|||false|||Room 1||||||:::";
        let (bridge, runner) = stub_bridge(vec![ok(payload)]);
        let query = EventQuery {
            from: Some(at(0, 0)),
            to: Some(at(23, 59)),
            search: Some("e".into()),
            limit: Some(10),
            ..Default::default()
        };
        let events = Calendar::new(bridge).list_events(&query).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].title, "Standup");
        assert_eq!(events[0].location, "Room 1");
        assert_eq!(events[1].start, Some(at(14, 0)));

        let src = runner.last_source();
        assert!(src.contains("start date is greater than or equal to boundDate1"));
        assert!(src.contains("summary contains \"e\""));
        assert!(src.contains("set outerItems to (calendars)"));
    }

    #[tokio::test]
    async fn test_limit_keeps_earliest_events() {
        let payload = "B1|||Work|||Review|||2024-05-20T14%3A00%3A00|||2024-05-20T15%3A00%3A00|||false|||||||||:::\
                       A1|||Home|||Standup|||2024-05-20T09%3A00%3A00|||2024-05-20T09%3A15%3A00|||false|||||||||:::";
        let (bridge, runner) = stub_bridge(vec![ok(payload)]);
        let query = EventQuery {
            limit: Some(1),
            ..Default::default()
        };
        let events = Calendar::new(bridge).list_events(&query).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Standup");
        assert!(!runner.last_source().contains("exit repeat"));
    }

    #[tokio::test]
    async fn test_list_events_in_named_calendar() {
        let (bridge, runner) = stub_bridge(vec![ok("")]);
        let query = EventQuery {
            calendar: Some("Wo\"rk".into()),
            ..Default::default()
        };
        let events = Calendar::new(bridge).list_events(&query).await.unwrap();
        assert!(events.is_empty());
        let src = runner.last_source();
        assert!(src.contains(r#"set outerItems to (calendars whose name is "Wo\"rk")"#));
        assert!(src.contains(r#"error "Calendar Wo\"rk not found" number -1728"#));
    }

    #[tokio::test]
    async fn test_create_rejects_inverted_range() {
        let (bridge, runner) = stub_bridge(vec![]);
        let event = NewEvent {
            calendar: None,
            title: "Late".into(),
            start: at(10, 0),
            end: at(9, 0),
            all_day: false,
            location: None,
            notes: None,
            url: None,
        };
        let err = Calendar::new(bridge).create_event(&event).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert_eq!(runner.invocations(), 0);
    }

    #[tokio::test]
    async fn test_create_event_omits_empty_properties() {
        let row = "NEW|||Home|||Lunch|||2024-05-20T12%3A00%3A00|||2024-05-20T13%3A00%3A00|||false|||||||||:::";
        let (bridge, runner) = stub_bridge(vec![ok(row)]);
        let event = NewEvent {
            calendar: Some("Home".into()),
            title: "Lunch".into(),
            start: at(12, 0),
            end: at(13, 0),
            all_day: false,
            location: Some(String::new()),
            notes: None,
            url: None,
        };
        let created = Calendar::new(bridge).create_event(&event).await.unwrap();
        assert_eq!(created.uid, "NEW");

        let src = runner.last_source();
        assert!(src.contains(
            "make new event at end of events of cal with properties {summary:\"Lunch\", start date:boundDate1, end date:boundDate2}"
        ));
        assert!(src.contains("set boundDate1 to my makeDate(2024, 5, 20, 12, 0, 0)"));
    }

    #[tokio::test]
    async fn test_update_requires_changes() {
        let (bridge, runner) = stub_bridge(vec![]);
        let err = Calendar::new(bridge)
            .update_event("abc", &EventChanges::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert_eq!(runner.invocations(), 0);
    }

    #[tokio::test]
    async fn test_update_clears_location() {
        let row = "abc|||Home|||Lunch|||||||||false|||||||||:::";
        let (bridge, runner) = stub_bridge(vec![ok(row)]);
        let changes = EventChanges {
            location: Some(String::new()),
            ..Default::default()
        };
        Calendar::new(bridge).update_event("abc", &changes).await.unwrap();
        let src = runner.last_source();
        assert!(src.contains("set location of rec to \"\""));
        assert!(src.contains(r#"set found to (events of cal whose uid is "abc")"#));
    }

    #[tokio::test]
    async fn test_missing_event_is_not_found() {
        let reply = ok(&format!(
            "{}-1728|Event nope not found",
            crate::bridge::script::ERROR_SENTINEL
        ));
        let (bridge, _) = stub_bridge(vec![reply]);
        let err = Calendar::new(bridge).delete_event("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
