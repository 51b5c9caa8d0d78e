//! Notes.app adapter

use std::sync::Arc;
use tracing::info;

use super::require_text;
use crate::bridge::Bridge;
use crate::bridge::escape::quote;
use crate::bridge::records::{FIELD_SEP, Field, RECORD_SEP, Record, RecordSchema};
use crate::bridge::richtext::{escape_html, to_html, to_plain_text};
use crate::bridge::script::{Create, Filter, Locate, Properties, Query, Script, Value};
use crate::error::Result;
use crate::types::{Note, NoteFolder};

const APP: &str = "Notes";

static FOLDERS: RecordSchema = RecordSchema {
    name: "note_folder",
    record_sep: RECORD_SEP,
    field_sep: FIELD_SEP,
    min_fields: 2,
    fields: &[
        Field::text("id", "id of rec"),
        Field::text("name", "name of rec"),
        Field::text("account", "name of acct"),
        Field::text("notes", "count of notes of rec"),
    ],
};

static NOTES: RecordSchema = RecordSchema {
    name: "note",
    record_sep: RECORD_SEP,
    field_sep: FIELD_SEP,
    min_fields: 3,
    fields: &[
        Field::text("id", "id of rec"),
        Field::text("title", "name of rec"),
        Field::text("folder", "name of container of rec"),
        Field::text("body", "body of rec"),
        Field::date("created", "creation date of rec"),
        Field::date("modified", "modification date of rec"),
    ],
};

pub struct Notes {
    bridge: Arc<Bridge>,
}

impl Notes {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }

    pub async fn list_folders(&self) -> Result<Vec<NoteFolder>> {
        self.bridge.check_platform()?;
        let mut script = Script::tell(APP);
        script.query(&Query::new("folders of acct").within("accounts", "acct"), &FOLDERS);
        let records = self.bridge.fetch(&script.build(), &FOLDERS).await?;
        records
            .iter()
            .map(|r| {
                Ok(NoteFolder {
                    id: r.text("id"),
                    name: r.text("name"),
                    account: r.text("account"),
                    notes: r.int("notes")?,
                })
            })
            .collect()
    }

    /// Notes in `folder` (every folder when `None`) whose title or text
    /// contains `search`
    pub async fn list(
        &self,
        folder: Option<&str>,
        search: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Note>> {
        self.bridge.check_platform()?;
        let source = match folder.filter(|f| !f.is_empty()) {
            Some(f) => format!("notes of folder {}", quote(f)),
            None => "notes".to_string(),
        };
        let filter = search.filter(|s| !s.is_empty()).map(|s| {
            Filter::Or(vec![
                Filter::contains("name", s),
                Filter::contains("plaintext", s),
            ])
        });
        let mut script = Script::tell(APP);
        script.query(&Query::new(source).filter(filter).limit(limit), &NOTES);
        let records = self.bridge.fetch(&script.build(), &NOTES).await?;
        records.iter().map(map_note).collect()
    }

    pub async fn get(&self, id: &str) -> Result<Note> {
        self.bridge.check_platform()?;
        require_text(id, "Note id")?;
        let mut script = Script::tell(APP);
        script.locate(&find_note(id)).returning(&NOTES);
        let record = self.bridge.fetch_one(&script.build(), &NOTES).await?;
        map_note(&record)
    }

    /// Create a note; `body` is plain text and is stored as escaped HTML
    pub async fn create(&self, title: &str, body: &str, folder: Option<&str>) -> Result<Note> {
        self.bridge.check_platform()?;
        require_text(title, "Note title")?;

        let mut html = format!("<div><h1>{}</h1></div>", escape_html(&title.replace('\n', " ")));
        if !body.is_empty() {
            html.push_str(&to_html(body));
        }
        let props = Properties::new().text("name", title).text("body", &html);
        let mut create = Create::new("note", props);
        if let Some(f) = folder.filter(|f| !f.is_empty()) {
            create = create.at(format!("folder {}", quote(f)));
        }

        let mut script = Script::tell(APP);
        script.create(&create).returning(&NOTES);
        let record = self.bridge.fetch_one(&script.build(), &NOTES).await?;
        let note = map_note(&record)?;
        info!("Created note '{}' in {}", note.title, note.folder);
        Ok(note)
    }

    /// Append plain text to the end of a note
    pub async fn append(&self, id: &str, text: &str) -> Result<Note> {
        self.bridge.check_platform()?;
        require_text(id, "Note id")?;
        require_text(text, "Text to append")?;
        let mut script = Script::tell(APP);
        script
            .locate(&find_note(id))
            .line(format!(
                "set body of rec to (body of rec) & {}",
                quote(&to_html(text))
            ))
            .returning(&NOTES);
        let record = self.bridge.fetch_one(&script.build(), &NOTES).await?;
        map_note(&record)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.bridge.check_platform()?;
        require_text(id, "Note id")?;
        let mut script = Script::tell(APP);
        script
            .locate(&find_note(id))
            .line("delete rec")
            .returning_nothing();
        self.bridge.run(&script.build()).await?;
        info!("Deleted note {}", id);
        Ok(())
    }
}

fn find_note(id: &str) -> Locate {
    Locate::new(
        "notes",
        Filter::equals("id", Value::text(id)),
        format!("Note {}", id),
    )
}

fn map_note(r: &Record) -> Result<Note> {
    Ok(Note {
        id: r.text("id"),
        title: r.text("title"),
        folder: r.text("folder"),
        body: to_plain_text(&r.text("body")),
        created: r.date("created")?,
        modified: r.date("modified")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::{ok, stub_bridge};
    use crate::error::ErrorKind;

    const NOTE: &str = "x-coredata%3A//N1|||Groceries|||Notes|||\
                        <div><h1>Groceries</h1></div><div>milk &amp; eggs</div><ul><li>bread</li></ul>|||\
                        2024-05-01T10%3A00%3A00|||2024-05-02T11%3A00%3A00:::";

    #[tokio::test]
    async fn test_list_normalizes_bodies() {
        let (bridge, runner) = stub_bridge(vec![ok(NOTE)]);
        let notes = Notes::new(bridge)
            .list(Some("Notes"), Some("milk"), 10)
            .await
            .unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, "x-coredata://N1");
        assert_eq!(notes[0].body, "Groceries\n\nmilk & eggs\n• bread");

        let src = runner.last_source();
        assert!(src.contains(
            r#"(notes of folder "Notes" whose (name contains "milk" or plaintext contains "milk"))"#
        ));
    }

    #[tokio::test]
    async fn test_create_escapes_body_html() {
        let (bridge, runner) = stub_bridge(vec![ok(NOTE)]);
        Notes::new(bridge)
            .create("To <do>", "a & b\nc", Some("Work"))
            .await
            .unwrap();
        let src = runner.last_source();
        assert!(src.contains(
            r#"make new note at folder "Work" with properties {name:"To <do>", body:"<div><h1>To &lt;do&gt;</h1></div><div>a &amp; b</div><div>c</div>"}"#
        ));
    }

    #[tokio::test]
    async fn test_create_requires_title() {
        let (bridge, runner) = stub_bridge(vec![]);
        let err = Notes::new(bridge).create("", "body", None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert_eq!(runner.invocations(), 0);
    }

    #[tokio::test]
    async fn test_append() {
        let (bridge, runner) = stub_bridge(vec![ok(NOTE)]);
        Notes::new(bridge)
            .append("x-coredata://N1", "more \"stuff\"")
            .await
            .unwrap();
        let src = runner.last_source();
        assert!(src.contains(
            r#"set body of rec to (body of rec) & "<div>more &quot;stuff&quot;</div>""#
        ));
    }

    #[tokio::test]
    async fn test_list_folders() {
        let (bridge, _) = stub_bridge(vec![ok("F1|||Notes|||iCloud|||12:::F2|||Work|||iCloud|||3:::")]);
        let folders = Notes::new(bridge).list_folders().await.unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].notes, 12);
    }
}
