//! Safari and Google Chrome adapter
//!
//! Tabs are addressed as `<browser>:<window>:<tab>` with 1-based indexes,
//! valid until windows or tabs are reordered.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::bridge::Bridge;
use crate::bridge::escape::quote;
use crate::bridge::records::{FIELD_SEP, Field, NEWLINE, RECORD_SEP, Record, RecordSchema, TAB};
use crate::bridge::script::{Create, Properties, Query, Script, Value, row_lines};
use crate::error::{BridgeError, Result};
use crate::types::{Bookmark, HistoryItem, Tab};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserKind {
    Safari,
    Chrome,
}

impl BrowserKind {
    pub fn app(&self) -> &'static str {
        match self {
            BrowserKind::Safari => "Safari",
            BrowserKind::Chrome => "Google Chrome",
        }
    }

    /// Tab id prefix
    pub fn prefix(&self) -> &'static str {
        match self {
            BrowserKind::Safari => "safari",
            BrowserKind::Chrome => "chrome",
        }
    }

    fn tabs_schema(&self) -> &'static RecordSchema {
        match self {
            BrowserKind::Safari => &SAFARI_TABS,
            BrowserKind::Chrome => &CHROME_TABS,
        }
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for BrowserKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "safari" => Ok(BrowserKind::Safari),
            "chrome" | "google chrome" => Ok(BrowserKind::Chrome),
            other => Err(BridgeError::invalid_input(format!(
                "Unknown browser '{}', expected safari or chrome",
                other
            ))),
        }
    }
}

// `w` is the window, `outerIndex` its index and `i` the tab's index in it
static SAFARI_TABS: RecordSchema = RecordSchema {
    name: "safari_tab",
    record_sep: RECORD_SEP,
    field_sep: FIELD_SEP,
    min_fields: 4,
    fields: &[
        Field::text("window", "outerIndex"),
        Field::text("tab", "i"),
        Field::text("title", "name of rec"),
        Field::text("url", "URL of rec"),
        Field::text("active", "(index of rec) = (index of current tab of w)"),
    ],
};

static CHROME_TABS: RecordSchema = RecordSchema {
    name: "chrome_tab",
    record_sep: RECORD_SEP,
    field_sep: FIELD_SEP,
    min_fields: 4,
    fields: &[
        Field::text("window", "outerIndex"),
        Field::text("tab", "i"),
        Field::text("title", "title of rec"),
        Field::text("url", "URL of rec"),
        Field::text("active", "(active tab index of w) = i"),
    ],
};

/// Emitted by the `walkFolder` handler; `folderPath` is the handler argument
static BOOKMARKS: RecordSchema = RecordSchema {
    name: "bookmark",
    record_sep: RECORD_SEP,
    field_sep: FIELD_SEP,
    min_fields: 2,
    fields: &[
        Field::text("title", "title of rec"),
        Field::text("url", "URL of rec"),
        Field::text("folder", "folderPath"),
    ],
};

/// Safari history rows straight from sqlite; expressions are SQL
static HISTORY: RecordSchema = RecordSchema {
    name: "history",
    record_sep: NEWLINE,
    field_sep: TAB,
    min_fields: 3,
    fields: &[
        Field::text("title", "coalesce(v.title, '')"),
        Field::text("url", "i.url"),
        Field::text(
            "visited_at",
            "datetime(v.visit_time + 978307200, 'unixepoch', 'localtime')",
        ),
        Field::text("visit_count", "i.visit_count"),
    ],
};

/// Rows scanned when history is filtered by a search term
const HISTORY_SCAN_ROWS: usize = 5000;

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "file"];

pub struct Browser {
    bridge: Arc<Bridge>,
    kind: BrowserKind,
}

impl Browser {
    pub fn new(bridge: Arc<Bridge>, kind: BrowserKind) -> Self {
        Self { bridge, kind }
    }

    pub fn kind(&self) -> BrowserKind {
        self.kind
    }

    pub async fn list_tabs(&self) -> Result<Vec<Tab>> {
        self.bridge.check_platform()?;
        let schema = self.kind.tabs_schema();
        let mut script = Script::tell(self.kind.app());
        script.query(&Query::new("tabs of w").within("windows", "w"), schema);
        let records = self.bridge.fetch(&script.build(), schema).await?;
        records.iter().map(|r| self.map_tab(r)).collect()
    }

    /// Open `url` in a new tab of the front window
    pub async fn open_tab(&self, url: &str) -> Result<Tab> {
        self.bridge.check_platform()?;
        let parsed = url::Url::parse(url)
            .map_err(|e| BridgeError::invalid_input(format!("Invalid URL '{}': {}", url, e)))?;
        if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
            return Err(BridgeError::invalid_input(format!(
                "Unsupported URL scheme '{}', expected http, https or file",
                parsed.scheme()
            )));
        }

        let schema = self.kind.tabs_schema();
        let mut script = Script::tell(self.kind.app());
        let new_window = match self.kind {
            BrowserKind::Safari => "make new document",
            BrowserKind::Chrome => "make new window",
        };
        script
            .line(format!("if (count of windows) = 0 then {}", new_window))
            .line("set w to front window")
            .line("set outerIndex to 1")
            .create(
                &Create::new("tab", Properties::new().set("URL", Value::text(parsed.as_str())))
                    .at("end of tabs of w"),
            );
        if self.kind == BrowserKind::Safari {
            script.line("set current tab of w to rec");
        }
        script
            .line("set i to count of tabs of w")
            .returning(schema);

        let record = self.bridge.fetch_one(&script.build(), schema).await?;
        let tab = self.map_tab(&record)?;
        info!("Opened {} in {}", tab.url, self.kind.app());
        Ok(tab)
    }

    pub async fn close_tab(&self, id: &str) -> Result<()> {
        self.bridge.check_platform()?;
        let (window, tab) = self.parse_tab_id(id)?;
        let mut script = Script::tell(self.kind.app());
        script
            .line(format!("close tab {} of window {}", tab, window))
            .returning_nothing();
        self.bridge.run(&script.build()).await?;
        Ok(())
    }

    /// Bring a tab to the front
    pub async fn activate_tab(&self, id: &str) -> Result<()> {
        self.bridge.check_platform()?;
        let (window, tab) = self.parse_tab_id(id)?;
        let mut script = Script::tell(self.kind.app());
        match self.kind {
            BrowserKind::Safari => script.line(format!(
                "set current tab of window {w} to tab {t} of window {w}",
                w = window,
                t = tab
            )),
            BrowserKind::Chrome => script.line(format!(
                "set active tab index of window {} to {}",
                window, tab
            )),
        };
        script
            .line(format!("set index of window {} to 1", window))
            .line("activate")
            .returning_nothing();
        self.bridge.run(&script.build()).await?;
        Ok(())
    }

    /// Every bookmark, walking folders recursively (Chrome only)
    pub async fn bookmarks(&self) -> Result<Vec<Bookmark>> {
        self.bridge.check_platform()?;
        if self.kind != BrowserKind::Chrome {
            return Err(BridgeError::invalid_input(
                "Bookmark listing is only available for Chrome",
            ));
        }

        let mut script = Script::tell(self.kind.app());
        script
            .handler(walk_folder_handler(self.kind.app()))
            .line("return my walkFolder(bookmarks bar, \"Bookmarks Bar\") & my walkFolder(other bookmarks, \"Other Bookmarks\")");
        let records = self.bridge.fetch(&script.build(), &BOOKMARKS).await?;
        Ok(records
            .iter()
            .map(|r| Bookmark {
                title: r.text("title"),
                url: r.text("url"),
                folder: r.text("folder"),
            })
            .collect())
    }

    /// Most recent visits first, optionally filtered by a case-insensitive
    /// substring of title or URL (Safari only)
    pub async fn history(&self, search: Option<&str>, limit: usize) -> Result<Vec<HistoryItem>> {
        self.bridge.check_platform()?;
        if self.kind != BrowserKind::Safari {
            return Err(BridgeError::invalid_input(
                "History is only available for Safari",
            ));
        }
        let search = search.filter(|s| !s.is_empty()).map(str::to_lowercase);
        let scan = if search.is_some() { HISTORY_SCAN_ROWS } else { limit };

        let mut script = Script::local(self.kind.app());
        script
            .line("set dbPath to (POSIX path of (path to home folder)) & \"Library/Safari/History.db\"")
            .line(format!(
                "return do shell script \"sqlite3 -readonly -separator \" & quoted form of tab & \" \" & quoted form of dbPath & \" \" & quoted form of {} without altering line endings",
                quote(&history_sql(scan))
            ));
        let records = self.bridge.fetch(&script.build(), &HISTORY).await?;
        debug!("Scanned {} history row(s)", records.len());

        let mut items = Vec::new();
        for r in &records {
            if items.len() >= limit {
                break;
            }
            let item = HistoryItem {
                title: r.text("title"),
                url: r.text("url"),
                visited_at: r.date("visited_at")?,
                visit_count: r.int("visit_count")?,
            };
            let matches = search.as_deref().is_none_or(|s| {
                item.title.to_lowercase().contains(s) || item.url.to_lowercase().contains(s)
            });
            if matches {
                items.push(item);
            }
        }
        Ok(items)
    }

    /// Split `<browser>:<window>:<tab>` into 1-based indexes
    pub fn parse_tab_id(&self, id: &str) -> Result<(u32, u32)> {
        let invalid = || {
            BridgeError::invalid_input(format!(
                "Invalid tab id '{}', expected {}:<window>:<tab>",
                id,
                self.kind.prefix()
            ))
        };
        let mut parts = id.split(':');
        let (Some(prefix), Some(window), Some(tab), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        if prefix != self.kind.prefix() {
            return Err(invalid());
        }
        let window: u32 = window.parse().map_err(|_| invalid())?;
        let tab: u32 = tab.parse().map_err(|_| invalid())?;
        if window == 0 || tab == 0 {
            return Err(invalid());
        }
        Ok((window, tab))
    }

    fn map_tab(&self, r: &Record) -> Result<Tab> {
        let schema = self.kind.tabs_schema().name;
        let window = u32::try_from(r.int("window")?)
            .map_err(|_| BridgeError::decode(schema, "Window index out of range"))?;
        let tab = u32::try_from(r.int("tab")?)
            .map_err(|_| BridgeError::decode(schema, "Tab index out of range"))?;
        Ok(Tab {
            id: format!("{}:{}:{}", self.kind.prefix(), window, tab),
            window_index: window,
            tab_index: tab,
            title: r.text("title"),
            url: r.text("url"),
            active: r.bool("active")?,
        })
    }
}

/// Recursive bookmark walker; rows are emitted from the bookmark schema
fn walk_folder_handler(app: &str) -> String {
    let mut handler = String::from("on walkFolder(theFolder, folderPath)\n");
    handler.push_str("    set output to \"\"\n");
    handler.push_str(&format!("    tell application {}\n", quote(app)));
    handler.push_str("        set theItems to bookmark items of theFolder\n");
    handler.push_str("        repeat with i from 1 to count of theItems\n");
    handler.push_str("            set rec to item i of theItems\n");
    for line in row_lines(&BOOKMARKS) {
        handler.push_str("            ");
        handler.push_str(&line);
        handler.push('\n');
    }
    handler.push_str("        end repeat\n");
    handler.push_str("        repeat with child in (bookmark folders of theFolder)\n");
    handler.push_str(
        "            set output to output & my walkFolder(child, folderPath & \"/\" & (title of child))\n",
    );
    handler.push_str("        end repeat\n");
    handler.push_str("    end tell\n");
    handler.push_str("    return output\n");
    handler.push_str("end walkFolder\n");
    handler
}

/// SELECT over Safari's history tables, percent-encoding each column the way
/// generated scripts encode fields
fn history_sql(limit: usize) -> String {
    let columns: Vec<String> = HISTORY.fields.iter().map(|f| sql_encode(f.expr)).collect();
    format!(
        "SELECT {} FROM history_visits v JOIN history_items i ON i.id = v.history_item \
         ORDER BY v.visit_time DESC LIMIT {};",
        columns.join(", "),
        limit
    )
}

fn sql_encode(expr: &str) -> String {
    format!(
        "replace(replace(replace(replace(CAST({} AS TEXT), '%', '%25'), char(9), '%09'), char(10), '%0A'), char(13), '%0D')",
        expr
    )
}
