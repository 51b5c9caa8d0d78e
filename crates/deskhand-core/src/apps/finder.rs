//! Finder adapter

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::require_text;
use crate::bridge::Bridge;
use crate::bridge::escape::quote;
use crate::bridge::records::{FIELD_SEP, Field, RECORD_SEP, Record, RecordSchema};
use crate::bridge::script::{Create, Properties, Query, Script};
use crate::error::{BridgeError, Result};
use crate::types::FileInfo;

const APP: &str = "Finder";

static FILES: RecordSchema = RecordSchema {
    name: "file",
    record_sep: RECORD_SEP,
    field_sep: FIELD_SEP,
    min_fields: 3,
    fields: &[
        Field::text("name", "name of rec"),
        Field::text("path", "POSIX path of (rec as alias)"),
        Field::text("kind", "kind of rec"),
        Field::text("is_directory", "(class of rec is folder) or (class of rec is disk)"),
        Field::text("size", "size of rec"),
        Field::date("created", "creation date of rec"),
        Field::date("modified", "modification date of rec"),
    ],
};

pub struct Finder {
    bridge: Arc<Bridge>,
}

impl Finder {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }

    /// Entries of a directory. Finder never reports invisible items; names
    /// starting with a dot are additionally dropped unless `include_hidden`.
    pub async fn list_directory(&self, path: &str, include_hidden: bool) -> Result<Vec<FileInfo>> {
        self.bridge.check_platform()?;
        let path = expand_path(path)?;
        let mut script = Script::tell(APP);
        script.query(
            &Query::new(format!("every item of {}", item_ref(&path))),
            &FILES,
        );
        let records = self.bridge.fetch(&script.build(), &FILES).await?;
        let mut files = records.iter().map(map_file).collect::<Result<Vec<_>>>()?;
        if !include_hidden {
            files.retain(|f| !f.name.starts_with('.'));
        }
        Ok(files)
    }

    /// File details plus Finder tags. Tags come from a second, optional
    /// lookup; if it fails the file is returned without tags.
    pub async fn file_info(&self, path: &str) -> Result<FileInfo> {
        self.bridge.check_platform()?;
        let path = expand_path(path)?;
        let mut script = Script::tell(APP);
        script
            .line(format!("set rec to {}", item_ref(&path)))
            .returning(&FILES);
        let record = self.bridge.fetch_one(&script.build(), &FILES).await?;
        let mut info = map_file(&record)?;

        info.tags = match self.tags(&path).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!("Could not read tags for {}: {}", path, e);
                Vec::new()
            }
        };
        Ok(info)
    }

    /// Items currently selected in the front Finder window
    pub async fn selection(&self) -> Result<Vec<FileInfo>> {
        self.bridge.check_platform()?;
        let mut script = Script::tell(APP);
        script.query(&Query::new("selection"), &FILES);
        let records = self.bridge.fetch(&script.build(), &FILES).await?;
        records.iter().map(map_file).collect()
    }

    pub async fn reveal(&self, path: &str) -> Result<()> {
        self.bridge.check_platform()?;
        let path = expand_path(path)?;
        let mut script = Script::tell(APP);
        script
            .line(format!("reveal {}", item_ref(&path)))
            .line("activate")
            .returning_nothing();
        self.bridge.run(&script.build()).await?;
        Ok(())
    }

    /// Move to the Trash
    pub async fn trash(&self, path: &str) -> Result<()> {
        self.bridge.check_platform()?;
        let path = expand_path(path)?;
        let mut script = Script::tell(APP);
        script
            .line(format!("delete {}", item_ref(&path)))
            .returning_nothing();
        self.bridge.run(&script.build()).await?;
        info!("Moved {} to the Trash", path);
        Ok(())
    }

    pub async fn create_folder(&self, parent: &str, name: &str) -> Result<FileInfo> {
        self.bridge.check_platform()?;
        let parent = expand_path(parent)?;
        require_text(name, "Folder name")?;
        if name.contains('/') || name.contains(':') {
            return Err(BridgeError::invalid_input(format!(
                "Folder name may not contain '/' or ':': {}",
                name
            )));
        }
        let mut script = Script::tell(APP);
        script
            .create(&Create::new("folder", Properties::new().text("name", name)).at(item_ref(&parent)))
            .returning(&FILES);
        let record = self.bridge.fetch_one(&script.build(), &FILES).await?;
        map_file(&record)
    }

    async fn tags(&self, path: &str) -> Result<Vec<String>> {
        let mut script = Script::local(APP);
        script.line(format!(
            "return do shell script \"mdls -raw -name kMDItemUserTags \" & quoted form of {}",
            quote(path)
        ));
        let output = self.bridge.run(&script.build()).await?;
        Ok(parse_tag_list(&output))
    }
}

/// Expand a leading `~` and require an absolute path
pub fn expand_path(path: &str) -> Result<String> {
    let expanded = if path == "~" || path.starts_with("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| BridgeError::invalid_input("Cannot determine home directory"))?;
        format!("{}{}", home.display(), &path[1..])
    } else {
        path.to_string()
    };
    if !Path::new(&expanded).is_absolute() {
        return Err(BridgeError::invalid_input(format!(
            "Path must be absolute: {}",
            path
        )));
    }
    Ok(expanded)
}

fn item_ref(path: &str) -> String {
    format!("item ((POSIX file {}) as text)", quote(path))
}

/// Parse `mdls -raw` list output: `(null)` or a parenthesised,
/// comma-separated list with optional quoting
fn parse_tag_list(output: &str) -> Vec<String> {
    let Some(inner) = output
        .trim()
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
    else {
        return Vec::new();
    };
    inner
        .lines()
        .map(|line| line.trim().trim_end_matches(',').trim().trim_matches('"'))
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

fn map_file(r: &Record) -> Result<FileInfo> {
    Ok(FileInfo {
        name: r.text("name"),
        path: r.text("path"),
        kind: r.text("kind"),
        is_directory: r.bool("is_directory")?,
        size: r.size("size")?,
        created: r.date("created")?,
        modified: r.date("modified")?,
        tags: Vec::new(),
    })
}
