use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use deskhand_core::{Bridge, BridgeError, PlatformGate};
use deskhand_core::apps::{
    Browser, BrowserKind, Calendar, ContactChanges, Contacts, EventChanges, EventQuery, Finder,
    Mail, MessageQuery, MessageRef, NewContact, NewEvent, NewReminder, Notes, OutgoingMail,
    Reminders,
};
use deskhand_core::bridge::records::parse_datetime;
use deskhand_core::types::LabeledValue;

mod config;
mod output;

use config::DeskhandConfig;
use output::Output;

#[derive(Parser)]
#[command(name = "deskhand")]
#[command(version)]
#[command(about = "Drive macOS Calendar, Mail, Contacts, Notes, Reminders, Finder and browsers from the command line")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Print JSON on a single line
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,

    /// Calendar events
    Calendar {
        #[command(subcommand)]
        action: CalendarCommand,
    },

    /// Mail messages and mailboxes
    Mail {
        #[command(subcommand)]
        action: MailCommand,
    },

    /// Contacts and groups
    Contacts {
        #[command(subcommand)]
        action: ContactsCommand,
    },

    /// Notes and folders
    Notes {
        #[command(subcommand)]
        action: NotesCommand,
    },

    /// Reminders and lists
    Reminders {
        #[command(subcommand)]
        action: RemindersCommand,
    },

    /// Files through Finder
    Finder {
        #[command(subcommand)]
        action: FinderCommand,
    },

    /// Safari or Chrome tabs, bookmarks and history
    Browser {
        /// "safari" or "chrome"; defaults to browser.default
        #[arg(short, long)]
        browser: Option<String>,

        #[command(subcommand)]
        action: BrowserCommand,
    },
}

#[derive(Subcommand)]
enum CalendarCommand {
    /// List calendars
    Calendars,
    /// List events, by default from now until calendar.days_ahead
    Events {
        #[arg(long)]
        calendar: Option<String>,
        #[arg(long, value_parser = parse_when)]
        from: Option<NaiveDateTime>,
        #[arg(long, value_parser = parse_when)]
        to: Option<NaiveDateTime>,
        /// Substring of the event title
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Create an event
    Create {
        title: String,
        #[arg(long, value_parser = parse_when)]
        start: NaiveDateTime,
        /// Defaults to one hour after start
        #[arg(long, value_parser = parse_when)]
        end: Option<NaiveDateTime>,
        #[arg(long)]
        calendar: Option<String>,
        #[arg(long)]
        all_day: bool,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        url: Option<String>,
    },
    /// Change fields of an event
    Update {
        uid: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, value_parser = parse_when)]
        start: Option<NaiveDateTime>,
        #[arg(long, value_parser = parse_when)]
        end: Option<NaiveDateTime>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete an event
    Delete { uid: String },
}

#[derive(Args)]
struct MessageArgs {
    /// Message id
    id: i64,
    /// Defaults to mail.default_mailbox
    #[arg(long)]
    mailbox: Option<String>,
    #[arg(long)]
    account: Option<String>,
}

#[derive(Subcommand)]
enum MailCommand {
    /// List mailboxes with unread counts
    Mailboxes,
    /// List messages in a mailbox, newest first
    List {
        #[arg(long)]
        mailbox: Option<String>,
        #[arg(long)]
        account: Option<String>,
        #[arg(long)]
        unread: bool,
        /// Substring of subject or sender
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Read one message including its body
    Read {
        #[command(flatten)]
        message: MessageArgs,
    },
    /// Send a message
    Send {
        #[arg(long)]
        to: Vec<String>,
        #[arg(long)]
        cc: Vec<String>,
        #[arg(long)]
        bcc: Vec<String>,
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long, default_value = "")]
        body: String,
        /// Sending address
        #[arg(long)]
        from: Option<String>,
    },
    /// Mark a message read, or unread with --unread
    MarkRead {
        #[command(flatten)]
        message: MessageArgs,
        #[arg(long)]
        unread: bool,
    },
    /// Flag a message, or remove the flag with --clear
    Flag {
        #[command(flatten)]
        message: MessageArgs,
        #[arg(long)]
        clear: bool,
    },
    /// Move a message to the trash
    Delete {
        #[command(flatten)]
        message: MessageArgs,
    },
}

#[derive(Subcommand)]
enum ContactsCommand {
    /// Find people whose name contains the query
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show one contact
    Get { id: String },
    /// Create a contact
    Create {
        #[arg(long)]
        first: Option<String>,
        #[arg(long)]
        last: Option<String>,
        #[arg(long)]
        organization: Option<String>,
        #[arg(long)]
        note: Option<String>,
        /// Email as `label=address` or `address`; repeatable
        #[arg(long, value_parser = parse_labeled)]
        email: Vec<LabeledValue>,
        /// Phone as `label=number` or `number`; repeatable
        #[arg(long, value_parser = parse_labeled)]
        phone: Vec<LabeledValue>,
    },
    /// Change name, organization or note of a contact
    Update {
        id: String,
        #[arg(long)]
        first: Option<String>,
        #[arg(long)]
        last: Option<String>,
        #[arg(long)]
        organization: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// List groups with member counts
    Groups,
}

#[derive(Subcommand)]
enum NotesCommand {
    /// List folders
    Folders,
    /// List notes
    List {
        #[arg(long)]
        folder: Option<String>,
        /// Substring of title or body
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show one note
    Get { id: String },
    /// Create a note from plain text
    Create {
        title: String,
        #[arg(long, default_value = "")]
        body: String,
        /// Defaults to notes.default_folder
        #[arg(long)]
        folder: Option<String>,
    },
    /// Append plain text to a note
    Append { id: String, text: String },
    /// Delete a note
    Delete { id: String },
}

#[derive(Subcommand)]
enum RemindersCommand {
    /// List reminder lists
    Lists,
    /// List reminders; incomplete only unless --all
    List {
        #[arg(long)]
        list: Option<String>,
        #[arg(long)]
        all: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Create a reminder
    Create {
        name: String,
        /// Defaults to reminders.default_list
        #[arg(long)]
        list: Option<String>,
        #[arg(long, value_parser = parse_when)]
        due: Option<NaiveDateTime>,
        #[arg(long)]
        notes: Option<String>,
        /// 0 none, 1-4 high, 5 medium, 6-9 low
        #[arg(long)]
        priority: Option<i64>,
    },
    /// Mark a reminder completed, or open again with --undo
    Complete {
        id: String,
        #[arg(long)]
        undo: bool,
    },
    /// Delete a reminder
    Delete { id: String },
}

#[derive(Subcommand)]
enum FinderCommand {
    /// List a directory
    Ls {
        #[arg(default_value = "~")]
        path: String,
        /// Include dot files
        #[arg(short, long)]
        all: bool,
    },
    /// Show details and tags of one file
    Info { path: String },
    /// Items selected in Finder
    Selection,
    /// Reveal a file in Finder
    Reveal { path: String },
    /// Move a file to the Trash
    Trash { path: String },
    /// Create a folder
    Mkdir { parent: String, name: String },
}

#[derive(Subcommand)]
enum BrowserCommand {
    /// List open tabs
    Tabs,
    /// Open a URL in a new tab
    Open { url: String },
    /// Close a tab by id
    Close { id: String },
    /// Bring a tab to the front
    Activate { id: String },
    /// Chrome bookmarks
    Bookmarks,
    /// Safari history, most recent first
    History {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
}

/// Top-level commands that talk to a desktop application
const INTEGRATION_COMMANDS: &[&str] = &[
    "calendar",
    "mail",
    "contacts",
    "notes",
    "reminders",
    "finder",
    "browser",
];

enum Parsed {
    Run(Cli),
    Usage(clap::Error),
    Unsupported(BridgeError),
}

/// Parse the command line. Integration commands on an unsupported host are
/// refused before clap validates any of their arguments.
fn parse_args(args: &[String], gate: &PlatformGate) -> Parsed {
    let wants_help = args
        .iter()
        .skip(1)
        .any(|a| matches!(a.as_str(), "-h" | "--help" | "-V" | "--version"));
    if requested_integration(args) && !wants_help {
        if let Err(e) = gate.check() {
            return Parsed::Unsupported(e);
        }
    }
    match Cli::try_parse_from(args) {
        Ok(cli) => Parsed::Run(cli),
        Err(e) => Parsed::Usage(e),
    }
}

/// Whether the first positional argument names an integration command
fn requested_integration(args: &[String]) -> bool {
    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                rest.next();
            }
            a if a.starts_with('-') => {}
            a => return INTEGRATION_COMMANDS.contains(&a),
        }
    }
    false
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let gate = PlatformGate::host();
    let cli = match parse_args(&args, &gate) {
        Parsed::Run(cli) => cli,
        Parsed::Usage(e) => e.exit(),
        Parsed::Unsupported(e) => {
            let compact = args.iter().any(|a| a == "--compact");
            let err = anyhow::Error::new(e);
            Output::new(!compact).print_error(&err);
            return ExitCode::from(output::exit_code(&err));
        }
    };

    // Logs go to stderr so stdout stays machine-readable
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let compact = cli.compact;
    match run(cli, &gate).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            Output::new(!compact).print_error(&e);
            ExitCode::from(output::exit_code(&e))
        }
    }
}

async fn run(cli: Cli, gate: &PlatformGate) -> Result<()> {
    match cli.command {
        Commands::Init => return cmd_init().await,
        Commands::Config => return cmd_config(&cli.config).await,
        _ => {}
    }

    // Refuse before the config is read on an unsupported host
    gate.check()?;
    let cfg = DeskhandConfig::load(&cli.config)?;
    let out = Output::new(cfg.output.pretty && !cli.compact);
    let bridge = Arc::new(Bridge::osascript(
        &cfg.bridge.interpreter,
        cfg.bridge.timeout(),
    ));
    debug!("Using interpreter {}", cfg.bridge.interpreter);

    match cli.command {
        Commands::Init | Commands::Config => Ok(()),
        Commands::Calendar { action } => cmd_calendar(&cfg, &out, bridge, action).await,
        Commands::Mail { action } => cmd_mail(&cfg, &out, bridge, action).await,
        Commands::Contacts { action } => cmd_contacts(&out, bridge, action).await,
        Commands::Notes { action } => cmd_notes(&cfg, &out, bridge, action).await,
        Commands::Reminders { action } => cmd_reminders(&cfg, &out, bridge, action).await,
        Commands::Finder { action } => cmd_finder(&out, bridge, action).await,
        Commands::Browser { browser, action } => {
            cmd_browser(&cfg, &out, bridge, browser.as_deref(), action).await
        }
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config)
            .await
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        info!("Created default config at {}", config_path.display());
    }

    println!("deskhand initialized at {}", config_dir.display());
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = DeskhandConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg)?);
    Ok(())
}

async fn cmd_calendar(
    cfg: &DeskhandConfig,
    out: &Output,
    bridge: Arc<Bridge>,
    action: CalendarCommand,
) -> Result<()> {
    let calendar = Calendar::new(bridge);
    match action {
        CalendarCommand::Calendars => out.print(&calendar.list_calendars().await?),
        CalendarCommand::Events {
            calendar: name,
            from,
            to,
            search,
            limit,
        } => {
            let (from, to) = event_window(from, to, cfg.calendar.days_ahead)?;
            let query = EventQuery {
                calendar: name,
                from: Some(from),
                to: Some(to),
                search,
                limit,
            };
            out.print(&calendar.list_events(&query).await?)
        }
        CalendarCommand::Create {
            title,
            start,
            end,
            calendar: name,
            all_day,
            location,
            notes,
            url,
        } => {
            let event = NewEvent {
                calendar: name.or_else(|| non_empty(&cfg.calendar.default_calendar)),
                title,
                start,
                end: match end {
                    Some(end) => end,
                    None => default_end(start)?,
                },
                all_day,
                location,
                notes,
                url,
            };
            out.print(&calendar.create_event(&event).await?)
        }
        CalendarCommand::Update {
            uid,
            title,
            start,
            end,
            location,
            notes,
        } => {
            let changes = EventChanges {
                title,
                start,
                end,
                location,
                notes,
            };
            out.print(&calendar.update_event(&uid, &changes).await?)
        }
        CalendarCommand::Delete { uid } => {
            calendar.delete_event(&uid).await?;
            out.done()
        }
    }
}

async fn cmd_mail(
    cfg: &DeskhandConfig,
    out: &Output,
    bridge: Arc<Bridge>,
    action: MailCommand,
) -> Result<()> {
    let mail = Mail::new(bridge);
    let message_ref = |args: MessageArgs| MessageRef {
        mailbox: args
            .mailbox
            .unwrap_or_else(|| cfg.mail.default_mailbox.clone()),
        account: args.account,
        id: args.id,
    };
    match action {
        MailCommand::Mailboxes => out.print(&mail.list_mailboxes().await?),
        MailCommand::List {
            mailbox,
            account,
            unread,
            search,
            limit,
        } => {
            let query = MessageQuery {
                mailbox: mailbox.unwrap_or_else(|| cfg.mail.default_mailbox.clone()),
                account,
                unread_only: unread,
                search,
                limit: limit.unwrap_or(cfg.mail.limit),
            };
            out.print(&mail.list_messages(&query).await?)
        }
        MailCommand::Read { message } => out.print(&mail.read_message(&message_ref(message)).await?),
        MailCommand::Send {
            to,
            cc,
            bcc,
            subject,
            body,
            from,
        } => {
            let outgoing = OutgoingMail {
                to,
                cc,
                bcc,
                subject,
                body,
                sender: from,
            };
            mail.send(&outgoing).await?;
            out.done()
        }
        MailCommand::MarkRead { message, unread } => {
            out.print(&mail.set_read(&message_ref(message), !unread).await?)
        }
        MailCommand::Flag { message, clear } => {
            out.print(&mail.set_flagged(&message_ref(message), !clear).await?)
        }
        MailCommand::Delete { message } => {
            mail.delete_message(&message_ref(message)).await?;
            out.done()
        }
    }
}

async fn cmd_contacts(out: &Output, bridge: Arc<Bridge>, action: ContactsCommand) -> Result<()> {
    let contacts = Contacts::new(bridge);
    match action {
        ContactsCommand::Search { query, limit } => {
            out.print(&contacts.search(&query, limit).await?)
        }
        ContactsCommand::Get { id } => out.print(&contacts.get(&id).await?),
        ContactsCommand::Create {
            first,
            last,
            organization,
            note,
            email,
            phone,
        } => {
            let contact = NewContact {
                first_name: first,
                last_name: last,
                organization,
                note,
                emails: email,
                phones: phone,
            };
            out.print(&contacts.create(&contact).await?)
        }
        ContactsCommand::Update {
            id,
            first,
            last,
            organization,
            note,
        } => {
            let changes = ContactChanges {
                first_name: first,
                last_name: last,
                organization,
                note,
            };
            out.print(&contacts.update(&id, &changes).await?)
        }
        ContactsCommand::Groups => out.print(&contacts.list_groups().await?),
    }
}

async fn cmd_notes(
    cfg: &DeskhandConfig,
    out: &Output,
    bridge: Arc<Bridge>,
    action: NotesCommand,
) -> Result<()> {
    let notes = Notes::new(bridge);
    match action {
        NotesCommand::Folders => out.print(&notes.list_folders().await?),
        NotesCommand::List {
            folder,
            search,
            limit,
        } => {
            let found = notes
                .list(
                    folder.as_deref(),
                    search.as_deref(),
                    limit.unwrap_or(cfg.notes.limit),
                )
                .await?;
            out.print(&found)
        }
        NotesCommand::Get { id } => out.print(&notes.get(&id).await?),
        NotesCommand::Create {
            title,
            body,
            folder,
        } => {
            let folder = folder.or_else(|| non_empty(&cfg.notes.default_folder));
            out.print(&notes.create(&title, &body, folder.as_deref()).await?)
        }
        NotesCommand::Append { id, text } => out.print(&notes.append(&id, &text).await?),
        NotesCommand::Delete { id } => {
            notes.delete(&id).await?;
            out.done()
        }
    }
}

async fn cmd_reminders(
    cfg: &DeskhandConfig,
    out: &Output,
    bridge: Arc<Bridge>,
    action: RemindersCommand,
) -> Result<()> {
    let reminders = Reminders::new(bridge);
    match action {
        RemindersCommand::Lists => out.print(&reminders.list_lists().await?),
        RemindersCommand::List { list, all, limit } => {
            out.print(&reminders.list(list.as_deref(), all, limit).await?)
        }
        RemindersCommand::Create {
            name,
            list,
            due,
            notes,
            priority,
        } => {
            let reminder = NewReminder {
                name,
                list: list.or_else(|| non_empty(&cfg.reminders.default_list)),
                due,
                notes,
                priority,
            };
            out.print(&reminders.create(&reminder).await?)
        }
        RemindersCommand::Complete { id, undo } => {
            out.print(&reminders.complete(&id, !undo).await?)
        }
        RemindersCommand::Delete { id } => {
            reminders.delete(&id).await?;
            out.done()
        }
    }
}

async fn cmd_finder(out: &Output, bridge: Arc<Bridge>, action: FinderCommand) -> Result<()> {
    let finder = Finder::new(bridge);
    match action {
        FinderCommand::Ls { path, all } => out.print(&finder.list_directory(&path, all).await?),
        FinderCommand::Info { path } => out.print(&finder.file_info(&path).await?),
        FinderCommand::Selection => out.print(&finder.selection().await?),
        FinderCommand::Reveal { path } => {
            finder.reveal(&path).await?;
            out.done()
        }
        FinderCommand::Trash { path } => {
            finder.trash(&path).await?;
            out.done()
        }
        FinderCommand::Mkdir { parent, name } => {
            out.print(&finder.create_folder(&parent, &name).await?)
        }
    }
}

async fn cmd_browser(
    cfg: &DeskhandConfig,
    out: &Output,
    bridge: Arc<Bridge>,
    browser: Option<&str>,
    action: BrowserCommand,
) -> Result<()> {
    let kind = match (browser, &action) {
        (Some(name), _) => name.parse::<BrowserKind>()?,
        // A tab id names its browser
        (None, BrowserCommand::Close { id } | BrowserCommand::Activate { id }) => {
            tab_browser(id).map_or_else(|| cfg.browser.kind(), Ok)?
        }
        (None, _) => cfg.browser.kind()?,
    };
    let browser = Browser::new(bridge, kind);
    match action {
        BrowserCommand::Tabs => out.print(&browser.list_tabs().await?),
        BrowserCommand::Open { url } => out.print(&browser.open_tab(&url).await?),
        BrowserCommand::Close { id } => {
            browser.close_tab(&id).await?;
            out.done()
        }
        BrowserCommand::Activate { id } => {
            browser.activate_tab(&id).await?;
            out.done()
        }
        BrowserCommand::Bookmarks => out.print(&browser.bookmarks().await?),
        BrowserCommand::History { search, limit } => {
            let items = browser
                .history(search.as_deref(), limit.unwrap_or(cfg.browser.history_limit))
                .await?;
            out.print(&items)
        }
    }
}

fn parse_when(s: &str) -> std::result::Result<NaiveDateTime, String> {
    parse_datetime(s).ok_or_else(|| {
        format!(
            "unrecognized date '{}', expected e.g. 2024-06-01 or 2024-06-01T09:30",
            s
        )
    })
}

fn parse_labeled(s: &str) -> std::result::Result<LabeledValue, String> {
    let (label, value) = match s.split_once('=') {
        Some((label, value)) => (label.trim(), value.trim()),
        None => ("", s.trim()),
    };
    if value.is_empty() {
        return Err(format!("missing value in '{}'", s));
    }
    Ok(LabeledValue {
        label: label.to_string(),
        value: value.to_string(),
    })
}

/// Default listing window: from now (or `from`) for `days_ahead` days
fn event_window(
    from: Option<NaiveDateTime>,
    to: Option<NaiveDateTime>,
    days_ahead: i64,
) -> Result<(NaiveDateTime, NaiveDateTime)> {
    let from = from.unwrap_or_else(|| Local::now().naive_local());
    let to = match to {
        Some(to) => to,
        None => Duration::try_days(days_ahead)
            .and_then(|span| from.checked_add_signed(span))
            .with_context(|| {
                format!("calendar.days_ahead = {} is out of range", days_ahead)
            })?,
    };
    Ok((from, to))
}

/// One hour after `start`
fn default_end(start: NaiveDateTime) -> Result<NaiveDateTime> {
    start
        .checked_add_signed(Duration::hours(1))
        .ok_or_else(|| BridgeError::invalid_input(format!("Start {} is out of range", start)).into())
}

fn tab_browser(id: &str) -> Option<BrowserKind> {
    id.split_once(':').and_then(|(prefix, _)| prefix.parse().ok())
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
