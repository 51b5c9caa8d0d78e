//! Contacts.app adapter

use std::sync::Arc;
use tracing::info;

use super::require_text;
use crate::bridge::Bridge;
use crate::bridge::escape::quote;
use crate::bridge::records::{FIELD_SEP, Field, RECORD_SEP, Record, RecordSchema};
use crate::bridge::script::{Create, Filter, Locate, Properties, Query, Script, Value};
use crate::error::{BridgeError, Result};
use crate::types::{Contact, ContactGroup, LabeledValue};

const APP: &str = "Contacts";

static PEOPLE: RecordSchema = RecordSchema {
    name: "contact",
    record_sep: RECORD_SEP,
    field_sep: FIELD_SEP,
    min_fields: 2,
    fields: &[
        Field::text("id", "id of rec"),
        Field::text("name", "name of rec"),
        Field::text("first_name", "first name of rec"),
        Field::text("last_name", "last name of rec"),
        Field::text("organization", "organization of rec"),
        Field::text("note", "note of rec"),
        Field::labeled("emails", "emails of rec"),
        Field::labeled("phones", "phones of rec"),
    ],
};

static GROUPS: RecordSchema = RecordSchema {
    name: "group",
    record_sep: RECORD_SEP,
    field_sep: FIELD_SEP,
    min_fields: 2,
    fields: &[
        Field::text("id", "id of rec"),
        Field::text("name", "name of rec"),
        Field::text("members", "count of people of rec"),
    ],
};

#[derive(Debug, Clone, Default)]
pub struct NewContact {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organization: Option<String>,
    pub note: Option<String>,
    pub emails: Vec<LabeledValue>,
    pub phones: Vec<LabeledValue>,
}

#[derive(Debug, Clone, Default)]
pub struct ContactChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organization: Option<String>,
    pub note: Option<String>,
}

impl ContactChanges {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.organization.is_none()
            && self.note.is_none()
    }
}

pub struct Contacts {
    bridge: Arc<Bridge>,
}

impl Contacts {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }

    /// People whose name contains `query`
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Contact>> {
        self.bridge.check_platform()?;
        require_text(query, "Search text")?;
        let mut script = Script::tell(APP);
        script.query(
            &Query::new("people")
                .filter(Some(Filter::contains("name", query)))
                .limit(limit),
            &PEOPLE,
        );
        let records = self.bridge.fetch(&script.build(), &PEOPLE).await?;
        records.iter().map(map_contact).collect()
    }

    pub async fn get(&self, id: &str) -> Result<Contact> {
        self.bridge.check_platform()?;
        require_text(id, "Contact id")?;
        let mut script = Script::tell(APP);
        script.locate(&find_person(id)).returning(&PEOPLE);
        let record = self.bridge.fetch_one(&script.build(), &PEOPLE).await?;
        map_contact(&record)
    }

    pub async fn create(&self, contact: &NewContact) -> Result<Contact> {
        self.bridge.check_platform()?;
        let named = [&contact.first_name, &contact.last_name, &contact.organization]
            .iter()
            .any(|v| v.as_deref().is_some_and(|s| !s.is_empty()));
        if !named {
            return Err(BridgeError::invalid_input(
                "A contact needs a first name, last name or organization",
            ));
        }

        let props = Properties::new()
            .opt_text("first name", contact.first_name.as_deref())
            .opt_text("last name", contact.last_name.as_deref())
            .opt_text("organization", contact.organization.as_deref())
            .opt_text("note", contact.note.as_deref());
        let mut script = Script::tell(APP);
        script.create(&Create::new("person", props));
        for (class, list, items) in [
            ("email", "emails", &contact.emails),
            ("phone", "phones", &contact.phones),
        ] {
            for item in items.iter().filter(|i| !i.value.is_empty()) {
                let label = if item.label.is_empty() { "other" } else { &item.label };
                script.line(format!(
                    "make new {} at end of {} of rec with properties {{label:{}, value:{}}}",
                    class,
                    list,
                    quote(label),
                    quote(&item.value)
                ));
            }
        }
        script.line("save").returning(&PEOPLE);

        let record = self.bridge.fetch_one(&script.build(), &PEOPLE).await?;
        let created = map_contact(&record)?;
        info!("Created contact {}", created.name);
        Ok(created)
    }

    pub async fn update(&self, id: &str, changes: &ContactChanges) -> Result<Contact> {
        self.bridge.check_platform()?;
        require_text(id, "Contact id")?;
        if changes.is_empty() {
            return Err(BridgeError::invalid_input("No changes given for contact"));
        }
        let props = Properties::new()
            .set_opt_text("first name", changes.first_name.as_deref())
            .set_opt_text("last name", changes.last_name.as_deref())
            .set_opt_text("organization", changes.organization.as_deref())
            .set_opt_text("note", changes.note.as_deref());
        let mut script = Script::tell(APP);
        script
            .locate(&find_person(id))
            .assign(&props)
            .line("save")
            .returning(&PEOPLE);
        let record = self.bridge.fetch_one(&script.build(), &PEOPLE).await?;
        map_contact(&record)
    }

    pub async fn list_groups(&self) -> Result<Vec<ContactGroup>> {
        self.bridge.check_platform()?;
        let mut script = Script::tell(APP);
        script.query(&Query::new("groups"), &GROUPS);
        let records = self.bridge.fetch(&script.build(), &GROUPS).await?;
        records
            .iter()
            .map(|r| {
                Ok(ContactGroup {
                    id: r.text("id"),
                    name: r.text("name"),
                    members: r.int("members")?,
                })
            })
            .collect()
    }
}

fn find_person(id: &str) -> Locate {
    Locate::new(
        "people",
        Filter::equals("id", Value::text(id)),
        format!("Contact {}", id),
    )
}

fn map_contact(r: &Record) -> Result<Contact> {
    Ok(Contact {
        id: r.text("id"),
        name: r.text("name"),
        first_name: r.text("first_name"),
        last_name: r.text("last_name"),
        organization: r.text("organization"),
        note: r.text("note"),
        emails: r.labeled("emails")?,
        phones: r.labeled("phones")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::{ok, stub_bridge};
    use crate::error::ErrorKind;

    const ANN: &str = "A1%3AABPerson|||Ann Lee|||Ann|||Lee|||Acme|||Met at%0Aconf|||\
                       _$!<Work>!$_=ann%40acme.com;;;_$!<Home>!$_=ann%40home.org|||\
                       _$!<Mobile>!$_=%2B1 555 0100:::";

    #[tokio::test]
    async fn test_search_maps_labeled_lists() {
        let (bridge, runner) = stub_bridge(vec![ok(ANN)]);
        let people = Contacts::new(bridge).search("Ann", 10).await.unwrap();
        assert_eq!(people.len(), 1);
        let ann = &people[0];
        assert_eq!(ann.id, "A1:ABPerson");
        assert_eq!(ann.note, "Met at\nconf");
        assert_eq!(ann.emails.len(), 2);
        assert_eq!(ann.emails[1].label, "Home");
        assert_eq!(ann.emails[1].value, "ann@home.org");
        assert_eq!(ann.phones[0].value, "+1 555 0100");
        assert!(runner.last_source().contains(r#"(people whose name contains "Ann")"#));
    }

    #[tokio::test]
    async fn test_contact_without_lists() {
        let (bridge, _) = stub_bridge(vec![ok("B2|||Bob:::")]);
        let bob = Contacts::new(bridge).get("B2").await.unwrap();
        assert_eq!(bob.name, "Bob");
        assert!(bob.emails.is_empty());
        assert!(bob.phones.is_empty());
    }

    #[tokio::test]
    async fn test_create_requires_a_name() {
        let (bridge, runner) = stub_bridge(vec![]);
        let err = Contacts::new(bridge)
            .create(&NewContact {
                first_name: Some(String::new()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert_eq!(runner.invocations(), 0);
    }

    #[tokio::test]
    async fn test_create_adds_list_items_and_saves() {
        let (bridge, runner) = stub_bridge(vec![ok("C3|||Cy:::")]);
        let contact = NewContact {
            first_name: Some("Cy".into()),
            emails: vec![LabeledValue {
                label: String::new(),
                value: "cy@example.com".into(),
            }],
            ..Default::default()
        };
        Contacts::new(bridge).create(&contact).await.unwrap();
        let src = runner.last_source();
        assert!(src.contains(r#"make new person with properties {first name:"Cy"}"#));
        assert!(src.contains(
            r#"make new email at end of emails of rec with properties {label:"other", value:"cy@example.com"}"#
        ));
        let save = src.find("        save\n").unwrap();
        let emit = src.find("set rowText to \"\"").unwrap();
        assert!(save < emit);
    }

    #[tokio::test]
    async fn test_list_groups() {
        let (bridge, _) = stub_bridge(vec![ok("G1|||Family|||4:::G2|||Work|||12:::")]);
        let groups = Contacts::new(bridge).list_groups().await.unwrap();
        assert_eq!(groups[1].members, 12);
    }
}
