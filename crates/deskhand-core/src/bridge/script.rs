//! AppleScript program builder
//!
//! Programs are assembled from a fixed preamble of helper handlers, an
//! optional set of extra handlers, and a `tell application` body wrapped in
//! a `try` block whose `on error` branch returns [`ERROR_SENTINEL`] followed
//! by `<number>|<message>`. That keeps script-level failures on stdout where
//! the runner can classify them, instead of letting the interpreter's own
//! diagnostic escape.
//!
//! User text only ever enters a program through [`Value::Text`] or
//! [`quote`]; property names, class names and collection expressions are
//! fixed strings owned by the adapters.

use chrono::{Datelike, NaiveDateTime, Timelike};

use super::escape::quote;
use super::records::{ENCODED_CHARS, FieldKind, LIST_SEP, PAIR_SEP, RecordSchema};

/// Prefix of a script's own error report on stdout
pub const ERROR_SENTINEL: &str = "@@DESKHAND_ERROR@@";

/// AppleScript error number for "Can't get <object>"
pub const NOT_FOUND_ERROR: i32 = -1728;

/// Generated source for one bridge call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptProgram {
    app: String,
    source: String,
}

impl ScriptProgram {
    /// Application the program talks to
    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// A value that can appear on the right-hand side of a property or filter
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Free text; always escaped
    Text(String),
    /// Built with the locale-independent `makeDate` helper
    Date(NaiveDateTime),
    Int(i64),
    Bool(bool),
    /// Trusted AppleScript expression composed by an adapter
    Expr(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn expr(s: impl Into<String>) -> Self {
        Value::Expr(s.into())
    }
}

/// Ordered property bag for `make new ... with properties` and updates
#[derive(Debug, Clone, Default)]
pub struct Properties {
    entries: Vec<(&'static str, Value)>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &'static str, value: Value) -> Self {
        self.entries.push((name, value));
        self
    }

    pub fn text(self, name: &'static str, value: &str) -> Self {
        self.set(name, Value::text(value))
    }

    /// Absent or empty text produces no property at all
    pub fn opt_text(self, name: &'static str, value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.is_empty() => self.text(name, v),
            _ => self,
        }
    }

    /// Like [`Properties::opt_text`], but an empty string is kept so the
    /// property can be cleared
    pub fn set_opt_text(self, name: &'static str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.text(name, v),
            None => self,
        }
    }

    pub fn opt_date(self, name: &'static str, value: Option<NaiveDateTime>) -> Self {
        match value {
            Some(d) => self.set(name, Value::Date(d)),
            None => self,
        }
    }

    pub fn opt_int(self, name: &'static str, value: Option<i64>) -> Self {
        match value {
            Some(n) => self.set(name, Value::Int(n)),
            None => self,
        }
    }

    pub fn opt_bool(self, name: &'static str, value: Option<bool>) -> Self {
        match value {
            Some(b) => self.set(name, Value::Bool(b)),
            None => self,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// `whose` clause
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Equals(&'static str, Value),
    Contains(&'static str, Value),
    AtLeast(&'static str, Value),
    AtMost(&'static str, Value),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn equals(property: &'static str, value: Value) -> Self {
        Filter::Equals(property, value)
    }

    pub fn contains(property: &'static str, text: &str) -> Self {
        Filter::Contains(property, Value::text(text))
    }

    /// Combine optional clauses with `and`; `None` when nothing remains
    pub fn all(filters: impl IntoIterator<Item = Filter>) -> Option<Filter> {
        let mut filters: Vec<Filter> = filters.into_iter().collect();
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Filter::And(filters)),
        }
    }
}

/// Outer loop around a query or lookup, e.g. every calendar or every window.
/// `var` names the current outer item and may be used by the inner source
/// and by field expressions; `outerIndex` holds its 1-based position.
#[derive(Debug, Clone)]
pub struct Outer {
    pub collection: String,
    pub var: &'static str,
}

/// Read query: every element of `source` matching `filter`, one row each
#[derive(Debug, Clone)]
pub struct Query {
    source: String,
    filter: Option<Filter>,
    outer: Option<Outer>,
    limit: Option<usize>,
    required: Option<String>,
}

impl Query {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            filter: None,
            outer: None,
            limit: None,
            required: None,
        }
    }

    pub fn filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn within(mut self, collection: impl Into<String>, var: &'static str) -> Self {
        self.outer = Some(Outer {
            collection: collection.into(),
            var,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// With [`Query::within`]: raise a not-found script error (number -1728)
    /// naming `what` when `source` resolves for no outer item, instead of
    /// returning no rows
    pub fn required(mut self, what: impl Into<String>) -> Self {
        self.required = Some(what.into());
        self
    }
}

/// Locate one existing object and bind it to `rec`, raising a not-found
/// script error (number -1728) when nothing matches.
#[derive(Debug, Clone)]
pub struct Locate {
    source: String,
    filter: Filter,
    outer: Option<Outer>,
    what: String,
}

impl Locate {
    /// `what` names the object in the not-found message, e.g. "Event 1234"
    pub fn new(source: impl Into<String>, filter: Filter, what: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            filter,
            outer: None,
            what: what.into(),
        }
    }

    pub fn within(mut self, collection: impl Into<String>, var: &'static str) -> Self {
        self.outer = Some(Outer {
            collection: collection.into(),
            var,
        });
        self
    }
}

/// Creation: `make new <class> [at <container>] with properties {...}`
#[derive(Debug, Clone)]
pub struct Create {
    class: &'static str,
    at: Option<String>,
    properties: Properties,
}

impl Create {
    pub fn new(class: &'static str, properties: Properties) -> Self {
        Self {
            class,
            at: None,
            properties,
        }
    }

    /// Container expression, e.g. `end of theList`
    pub fn at(mut self, container: impl Into<String>) -> Self {
        self.at = Some(container.into());
        self
    }
}

/// Builder for one program against one application
#[derive(Debug)]
pub struct Script {
    app: String,
    tell: bool,
    handlers: Vec<String>,
    body: Vec<String>,
    indent: usize,
    bindings: usize,
}

impl Script {
    pub fn tell(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            tell: true,
            handlers: Vec::new(),
            body: Vec::new(),
            indent: 0,
            bindings: 0,
        }
    }

    /// Program without a `tell` block, for scripting additions such as
    /// `do shell script`. `label` only names the program in errors.
    pub fn local(label: impl Into<String>) -> Self {
        Self {
            tell: false,
            ..Self::tell(label)
        }
    }

    /// Add a top-level handler definition
    pub fn handler(&mut self, source: impl Into<String>) -> &mut Self {
        self.handlers.push(source.into());
        self
    }

    /// Append one statement inside the `tell` block
    pub fn line(&mut self, line: impl AsRef<str>) -> &mut Self {
        let line = line.as_ref();
        self.body.push(format!("{}{}", "    ".repeat(self.indent), line));
        self
    }

    fn open(&mut self, line: impl AsRef<str>) {
        self.line(line);
        self.indent += 1;
    }

    fn close(&mut self, line: impl AsRef<str>) {
        self.indent = self.indent.saturating_sub(1);
        self.line(line);
    }

    /// Render a value for interpolation. Dates are bound to a variable first
    /// so they are built locally rather than inside an application reference.
    pub fn value(&mut self, value: &Value) -> String {
        match value {
            Value::Text(s) => quote(s),
            Value::Int(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Expr(e) => e.clone(),
            Value::Date(d) => {
                self.bindings += 1;
                let var = format!("boundDate{}", self.bindings);
                let line = format!("set {} to {}", var, make_date(d));
                self.line(line);
                var
            }
        }
    }

    fn filter_clause(&mut self, filter: &Filter) -> String {
        match filter {
            Filter::Equals(prop, v) => format!("{} is {}", prop, self.value(v)),
            Filter::Contains(prop, v) => format!("{} contains {}", prop, self.value(v)),
            Filter::AtLeast(prop, v) => {
                format!("{} is greater than or equal to {}", prop, self.value(v))
            }
            Filter::AtMost(prop, v) => {
                format!("{} is less than or equal to {}", prop, self.value(v))
            }
            Filter::And(parts) => self.join_filters(parts, " and "),
            Filter::Or(parts) => self.join_filters(parts, " or "),
        }
    }

    fn join_filters(&mut self, parts: &[Filter], op: &str) -> String {
        let rendered: Vec<String> = parts.iter().map(|f| self.filter_clause(f)).collect();
        format!("({})", rendered.join(op))
    }

    fn source_with_filter(&mut self, source: &str, filter: Option<&Filter>) -> String {
        match filter {
            Some(f) => {
                let clause = self.filter_clause(f);
                format!("({} whose {})", source, clause)
            }
            None => format!("({})", source),
        }
    }

    fn properties_record(&mut self, props: &Properties) -> String {
        let rendered: Vec<String> = props
            .entries
            .iter()
            .map(|(name, v)| format!("{}:{}", name, self.value(v)))
            .collect();
        format!("{{{}}}", rendered.join(", "))
    }

    /// Append the row for `rec` to `output`
    pub fn emit_row(&mut self, schema: &RecordSchema) -> &mut Self {
        for line in row_lines(schema) {
            self.line(line);
        }
        self
    }

    /// Query shape: rows for every matching element
    pub fn query(&mut self, query: &Query, schema: &RecordSchema) -> &mut Self {
        self.line("set output to \"\"");
        self.line("set emitted to 0");
        let tracked = query.outer.is_some() && query.required.is_some();
        if tracked {
            self.line("set resolved to false");
        }
        if let Some(outer) = &query.outer {
            self.line(format!("set outerItems to ({})", outer.collection));
            self.open("repeat with outerIndex from 1 to count of outerItems");
            self.line(format!("set {} to item outerIndex of outerItems", outer.var));
            self.line("set theItems to {}");
            self.open("try");
            let source = self.source_with_filter(&query.source, query.filter.as_ref());
            self.line(format!("set theItems to {}", source));
            if tracked {
                self.line("set resolved to true");
            }
            self.close("end try");
        } else {
            let source = self.source_with_filter(&query.source, query.filter.as_ref());
            self.line(format!("set theItems to {}", source));
        }
        self.open("repeat with i from 1 to count of theItems");
        if let Some(limit) = query.limit {
            self.line(format!(
                "if emitted is greater than or equal to {} then exit repeat",
                limit
            ));
        }
        self.line("set rec to item i of theItems");
        self.emit_row(schema);
        self.line("set emitted to emitted + 1");
        self.close("end repeat");
        if query.outer.is_some() {
            self.close("end repeat");
        }
        if let (true, Some(what)) = (tracked, &query.required) {
            self.line(format!(
                "if not resolved then error {} number {}",
                quote(&format!("{} not found", what)),
                NOT_FOUND_ERROR
            ));
        }
        self.line("return output");
        self
    }

    /// Bind the located object to `rec`
    pub fn locate(&mut self, locate: &Locate) -> &mut Self {
        let missing = format!(
            "error {} number {}",
            quote(&format!("{} not found", locate.what)),
            NOT_FOUND_ERROR
        );
        match &locate.outer {
            Some(outer) => {
                self.line("set rec to missing value");
                self.line(format!("set outerItems to ({})", outer.collection));
                self.open("repeat with outerIndex from 1 to count of outerItems");
                self.line(format!("set {} to item outerIndex of outerItems", outer.var));
                self.line("set found to {}");
                self.open("try");
                let source = self.source_with_filter(&locate.source, Some(&locate.filter));
                self.line(format!("set found to {}", source));
                self.close("end try");
                self.open("if (count of found) > 0 then");
                self.line("set rec to item 1 of found");
                self.line("exit repeat");
                self.close("end if");
                self.close("end repeat");
                self.line(format!("if rec is missing value then {}", missing));
            }
            None => {
                let source = self.source_with_filter(&locate.source, Some(&locate.filter));
                self.line(format!("set found to {}", source));
                self.line(format!("if (count of found) = 0 then {}", missing));
                self.line("set rec to item 1 of found");
            }
        }
        self
    }

    /// Create shape: binds the new object to `rec`; follow with
    /// [`Script::returning`] or further statements
    pub fn create(&mut self, create: &Create) -> &mut Self {
        let at = create
            .at
            .as_ref()
            .map(|c| format!(" at {}", c))
            .unwrap_or_default();
        if create.properties.is_empty() {
            self.line(format!("set rec to make new {}{}", create.class, at));
        } else {
            let props = self.properties_record(&create.properties);
            self.line(format!(
                "set rec to make new {}{} with properties {}",
                create.class, at, props
            ));
        }
        self
    }

    /// Mutate shape: `set <prop> of rec to <value>` for each property
    pub fn assign(&mut self, props: &Properties) -> &mut Self {
        for (name, value) in &props.entries {
            let rendered = self.value(value);
            self.line(format!("set {} of rec to {}", name, rendered));
        }
        self
    }

    /// Finish by returning the row for `rec`
    pub fn returning(&mut self, schema: &RecordSchema) -> &mut Self {
        self.line("set output to \"\"");
        self.emit_row(schema);
        self.line("return output");
        self
    }

    /// Finish with an empty result
    pub fn returning_nothing(&mut self) -> &mut Self {
        self.line("return \"\"");
        self
    }

    pub fn build(&self) -> ScriptProgram {
        let mut source = String::from(PREAMBLE);
        for handler in &self.handlers {
            source.push('\n');
            source.push_str(handler.trim_end());
            source.push('\n');
        }
        source.push_str(&encode_field_handler());
        source.push_str("\ntry\n");
        let pad = if self.tell {
            source.push_str(&format!("    tell application {}\n", quote(&self.app)));
            "        "
        } else {
            "    "
        };
        for line in &self.body {
            source.push_str(pad);
            source.push_str(line);
            source.push('\n');
        }
        if self.tell {
            source.push_str("    end tell\n");
        }
        source.push_str("on error errMsg number errNum\n");
        source.push_str(&format!(
            "    return \"{}\" & errNum & \"|\" & errMsg\n",
            ERROR_SENTINEL
        ));
        source.push_str("end try\n");
        ScriptProgram {
            app: self.app.clone(),
            source,
        }
    }
}

/// Statements that append the row for `rec` to `output`.
/// Each field is evaluated inside its own `try` so an unavailable property
/// reads as empty instead of failing the whole query.
pub(crate) fn row_lines(schema: &RecordSchema) -> Vec<String> {
    let mut lines = vec!["set rowText to \"\"".to_string()];
    let field_sep = separator_expr(schema.field_sep);
    for (idx, field) in schema.fields.iter().enumerate() {
        lines.push("set fieldValue to \"\"".to_string());
        lines.push("try".to_string());
        match field.kind {
            FieldKind::Text => {
                lines.push(format!("    set fieldValue to my encodeField({})", field.expr))
            }
            FieldKind::Date => lines.push(format!(
                "    set fieldValue to my encodeField(my isoDate({}))",
                field.expr
            )),
            FieldKind::Labeled => {
                lines.push(format!("    repeat with anItem in ({})", field.expr));
                lines.push(format!(
                    "        if fieldValue is not \"\" then set fieldValue to fieldValue & {}",
                    quote(LIST_SEP)
                ));
                lines.push(format!(
                    "        set fieldValue to fieldValue & my encodeField(label of anItem) & {} & my encodeField(value of anItem)",
                    quote(PAIR_SEP)
                ));
                lines.push("    end repeat".to_string());
            }
        }
        lines.push("end try".to_string());
        if idx + 1 < schema.fields.len() {
            lines.push(format!(
                "set rowText to rowText & fieldValue & {}",
                field_sep
            ));
        } else {
            lines.push("set rowText to rowText & fieldValue".to_string());
        }
    }
    lines.push(format!(
        "set output to output & rowText & {}",
        separator_expr(schema.record_sep)
    ));
    lines
}

/// AppleScript expression for a separator token
pub(crate) fn separator_expr(sep: &str) -> String {
    match sep {
        "\t" => "tab".to_string(),
        "\n" => "linefeed".to_string(),
        other => quote(other),
    }
}

fn make_date(d: &NaiveDateTime) -> String {
    format!(
        "my makeDate({}, {}, {}, {}, {}, {})",
        d.year(),
        d.month(),
        d.day(),
        d.hour(),
        d.minute(),
        d.second()
    )
}

fn encode_field_handler() -> String {
    let mut handler = String::from(
        "\non encodeField(v)\n    if v is missing value then return \"\"\n    set t to v as text\n",
    );
    for (c, expr) in ENCODED_CHARS {
        handler.push_str(&format!(
            "    set t to my replaceText(t, {}, \"%{:02X}\")\n",
            expr, *c as u32
        ));
    }
    handler.push_str("    return t\nend encodeField\n");
    handler
}

const PREAMBLE: &str = r#"on replaceText(theText, findText, replaceWith)
    if theText does not contain findText then return theText
    set savedDelimiters to AppleScript's text item delimiters
    set AppleScript's text item delimiters to findText
    set parts to text items of theText
    set AppleScript's text item delimiters to replaceWith
    set theText to parts as text
    set AppleScript's text item delimiters to savedDelimiters
    return theText
end replaceText

on isoDate(d)
    if d is missing value then return ""
    return (d as «class isot» as string)
end isoDate

on makeDate(y, m, d, hh, mm, ss)
    set theDate to current date
    set day of theDate to 1
    set year of theDate to y
    set month of theDate to m
    set day of theDate to d
    set time of theDate to (hh * hours) + (mm * minutes) + ss
    return theDate
end makeDate
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::records::{FIELD_SEP, Field, RECORD_SEP};
    use chrono::NaiveDate;

    static ITEMS: RecordSchema = RecordSchema {
        name: "items",
        record_sep: RECORD_SEP,
        field_sep: FIELD_SEP,
        min_fields: 2,
        fields: &[
            Field::text("name", "name of rec"),
            Field::date("due", "due date of rec"),
            Field::labeled("emails", "emails of rec"),
        ],
    };

    fn date(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_program_is_guarded() {
        let mut script = Script::tell("Reminders");
        script.returning_nothing();
        let program = script.build();
        assert_eq!(program.app(), "Reminders");
        let src = program.source();
        assert!(src.contains("tell application \"Reminders\""));
        assert!(src.contains("on error errMsg number errNum"));
        assert!(src.contains(ERROR_SENTINEL));
        assert!(src.contains("on encodeField(v)"));
        // percent must be encoded before anything that introduces a percent
        let pct = src.find("\"%25\"").unwrap();
        let pipe = src.find("\"%7C\"").unwrap();
        assert!(pct < pipe);
    }

    #[test]
    fn test_local_program_has_no_tell_block() {
        let mut script = Script::local("Finder");
        script.line("return do shell script \"true\"");
        let program = script.build();
        assert_eq!(program.app(), "Finder");
        assert!(!program.source().contains("tell application"));
        assert!(program.source().contains("    return do shell script \"true\""));
    }

    #[test]
    fn test_absent_optional_properties_emit_nothing() {
        let props = Properties::new()
            .text("summary", "Standup")
            .opt_text("location", None)
            .opt_text("description", Some(""));
        assert_eq!(props.len(), 1);

        let mut script = Script::tell("Calendar");
        script.create(&Create::new("event", props).at("end of events of targetCal"));
        let src = script.build().source().to_string();
        assert!(src.contains("make new event at end of events of targetCal with properties {summary:\"Standup\"}"));
        assert!(!src.contains("location"));
        assert!(!src.contains("description"));
    }

    #[test]
    fn test_text_values_are_escaped() {
        let props = Properties::new().text("name", "say \"hi\" \\ bye");
        let mut script = Script::tell("Notes");
        script.create(&Create::new("note", props));
        let src = script.build().source().to_string();
        assert!(src.contains(r#"{name:"say \"hi\" \\ bye"}"#));
    }

    #[test]
    fn test_dates_are_bound_before_use() {
        let props = Properties::new().opt_date("due date", Some(date(2024, 2, 29, 17, 45)));
        let mut script = Script::tell("Reminders");
        script.create(&Create::new("reminder", props));
        let src = script.build().source().to_string();
        let bind = src
            .find("set boundDate1 to my makeDate(2024, 2, 29, 17, 45, 0)")
            .unwrap();
        let used = src.find("{due date:boundDate1}").unwrap();
        assert!(bind < used);
    }

    #[test]
    fn test_query_with_filter_and_limit() {
        let filter = Filter::all([
            Filter::contains("name", "milk\""),
            Filter::equals("completed", Value::Bool(false)),
        ]);
        let mut script = Script::tell("Reminders");
        script.query(
            &Query::new("reminders of theList").filter(filter).limit(5),
            &ITEMS,
        );
        let src = script.build().source().to_string();
        assert!(src.contains(
            r#"set theItems to (reminders of theList whose (name contains "milk\"" and completed is false))"#
        ));
        assert!(src.contains("if emitted is greater than or equal to 5 then exit repeat"));
        assert!(src.contains("return output"));
    }

    #[test]
    fn test_query_within_outer_collection() {
        let mut script = Script::tell("Calendar");
        script.query(&Query::new("every event of cal").within("calendars", "cal"), &ITEMS);
        let src = script.build().source().to_string();
        assert!(src.contains("set outerItems to (calendars)"));
        assert!(src.contains("set cal to item outerIndex of outerItems"));
        assert!(src.contains("set theItems to (every event of cal)"));
    }

    #[test]
    fn test_required_query_raises_when_nothing_resolves() {
        let mut script = Script::tell("Mail");
        script.query(
            &Query::new("messages of mailbox \"INBX\" of acct")
                .within("accounts", "acct")
                .required("Mailbox INBX"),
            &ITEMS,
        );
        let src = script.build().source().to_string();
        let reset = src.find("set resolved to false").unwrap();
        let source = src.find("set theItems to (messages of mailbox").unwrap();
        let resolved = src.find("set resolved to true").unwrap();
        let raise = src
            .find(r#"if not resolved then error "Mailbox INBX not found" number -1728"#)
            .unwrap();
        let ret = src.rfind("return output").unwrap();
        assert!(reset < source && source < resolved && resolved < raise && raise < ret);
    }

    #[test]
    fn test_optional_query_does_not_track_resolution() {
        let mut script = Script::tell("Calendar");
        script.query(&Query::new("events of cal").within("calendars", "cal"), &ITEMS);
        assert!(!script.build().source().contains("resolved"));
    }

    #[test]
    fn test_row_lines_follow_schema() {
        let lines = row_lines(&ITEMS).join("\n");
        assert!(lines.contains("set fieldValue to my encodeField(name of rec)"));
        assert!(lines.contains("set fieldValue to my encodeField(my isoDate(due date of rec))"));
        assert!(lines.contains("repeat with anItem in (emails of rec)"));
        assert!(lines.contains(r#"set rowText to rowText & fieldValue & "|||""#));
        assert!(lines.contains(r#"set output to output & rowText & ":::""#));
        // three fields, two field separators
        assert_eq!(lines.matches("& \"|||\"").count(), 2);
    }

    #[test]
    fn test_tabular_separators_use_constants() {
        assert_eq!(separator_expr("\t"), "tab");
        assert_eq!(separator_expr("\n"), "linefeed");
        assert_eq!(separator_expr(":::"), "\":::\"");
    }

    #[test]
    fn test_locate_raises_not_found_with_escaped_name() {
        let mut script = Script::tell("Notes");
        script.locate(&Locate::new(
            "notes",
            Filter::equals("id", Value::text("x-coredata://\"1")),
            "Note x-coredata://\"1",
        ));
        script.line("delete rec");
        let src = script.build().source().to_string();
        assert!(src.contains(r#"set found to (notes whose id is "x-coredata://\"1")"#));
        assert!(src.contains(r#"error "Note x-coredata://\"1 not found" number -1728"#));
    }

    #[test]
    fn test_locate_within_outer_collection() {
        let mut script = Script::tell("Calendar");
        script.locate(
            &Locate::new("events of cal", Filter::equals("uid", Value::text("E1")), "Event E1")
                .within("calendars", "cal"),
        );
        let src = script.build().source().to_string();
        assert!(src.contains("set rec to missing value"));
        assert!(src.contains(r#"set found to (events of cal whose uid is "E1")"#));
        assert!(src.contains("if rec is missing value then error"));
    }

    #[test]
    fn test_assign_sets_each_property() {
        let mut script = Script::tell("Reminders");
        script.assign(&Properties::new().set("completed", Value::Bool(true)).text("body", "x"));
        let src = script.build().source().to_string();
        assert!(src.contains("set completed of rec to true"));
        assert!(src.contains("set body of rec to \"x\""));
    }
}
