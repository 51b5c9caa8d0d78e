//! Application adapters
//!
//! Each adapter owns its record schemas and script templates and shares one
//! [`Bridge`](crate::bridge::Bridge). Every operation checks the platform
//! gate first, validates its arguments, then builds, runs and decodes.

pub mod browser;
pub mod calendar;
pub mod contacts;
pub mod finder;
pub mod mail;
pub mod notes;
pub mod reminders;

pub use browser::{Browser, BrowserKind};
pub use calendar::{Calendar, EventChanges, EventQuery, NewEvent};
pub use contacts::{ContactChanges, Contacts, NewContact};
pub use finder::Finder;
pub use mail::{Mail, MessageQuery, MessageRef, OutgoingMail};
pub use notes::Notes;
pub use reminders::{NewReminder, Reminders};

use crate::error::{BridgeError, Result};

/// Reject empty or whitespace-only text before any script is built
pub(crate) fn require_text(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(BridgeError::invalid_input(format!("{} must not be empty", what)))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::unsupported_bridge;
    use crate::error::ErrorKind;
    use chrono::NaiveDate;

    fn assert_unsupported<T: std::fmt::Debug>(op: &str, result: Result<T>) {
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::PlatformUnsupported, "{}", op);
    }

    #[test]
    fn test_require_text() {
        assert!(require_text("x", "Name").is_ok());
        let err = require_text("  ", "Name").unwrap_err();
        assert_eq!(err.message, "Name must not be empty");
    }

    /// Every operation fails on a non-macOS host without running anything,
    /// even when its arguments are also invalid
    #[tokio::test]
    async fn test_every_operation_is_gated() {
        let (bridge, runner) = unsupported_bridge();
        let when = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();

        let calendar = Calendar::new(bridge.clone());
        assert_unsupported("list_calendars", calendar.list_calendars().await);
        assert_unsupported("list_events", calendar.list_events(&EventQuery::default()).await);
        let event = NewEvent {
            calendar: None,
            title: String::new(),
            start: when,
            end: when,
            all_day: false,
            location: None,
            notes: None,
            url: None,
        };
        assert_unsupported("create_event", calendar.create_event(&event).await);
        assert_unsupported(
            "update_event",
            calendar.update_event("", &EventChanges::default()).await,
        );
        assert_unsupported("delete_event", calendar.delete_event("x").await);

        let mail = Mail::new(bridge.clone());
        let msg = MessageRef {
            mailbox: "INBOX".into(),
            account: None,
            id: 1,
        };
        assert_unsupported("list_mailboxes", mail.list_mailboxes().await);
        assert_unsupported("list_messages", mail.list_messages(&MessageQuery::default()).await);
        assert_unsupported("read_message", mail.read_message(&msg).await);
        assert_unsupported("send", mail.send(&OutgoingMail::default()).await);
        assert_unsupported("set_read", mail.set_read(&msg, true).await);
        assert_unsupported("set_flagged", mail.set_flagged(&msg, true).await);
        assert_unsupported("delete_message", mail.delete_message(&msg).await);

        let contacts = Contacts::new(bridge.clone());
        assert_unsupported("search", contacts.search("a", 5).await);
        assert_unsupported("get", contacts.get("a").await);
        assert_unsupported("create", contacts.create(&NewContact::default()).await);
        assert_unsupported(
            "update",
            contacts.update("a", &ContactChanges::default()).await,
        );
        assert_unsupported("list_groups", contacts.list_groups().await);

        let notes = Notes::new(bridge.clone());
        assert_unsupported("list_folders", notes.list_folders().await);
        assert_unsupported("list", notes.list(None, None, 5).await);
        assert_unsupported("get", notes.get("n").await);
        assert_unsupported("create", notes.create("t", "b", None).await);
        assert_unsupported("append", notes.append("n", "x").await);
        assert_unsupported("delete", notes.delete("n").await);

        let reminders = Reminders::new(bridge.clone());
        assert_unsupported("list_lists", reminders.list_lists().await);
        assert_unsupported("list", reminders.list(None, false, None).await);
        assert_unsupported("create", reminders.create(&NewReminder::default()).await);
        assert_unsupported("complete", reminders.complete("r", true).await);
        assert_unsupported("delete", reminders.delete("r").await);

        let finder = Finder::new(bridge.clone());
        assert_unsupported("list_directory", finder.list_directory("relative", false).await);
        assert_unsupported("file_info", finder.file_info("/tmp").await);
        assert_unsupported("selection", finder.selection().await);
        assert_unsupported("reveal", finder.reveal("/tmp").await);
        assert_unsupported("trash", finder.trash("/tmp").await);
        assert_unsupported("create_folder", finder.create_folder("/tmp", "x").await);

        for kind in [BrowserKind::Safari, BrowserKind::Chrome] {
            let browser = Browser::new(bridge.clone(), kind);
            assert_unsupported("list_tabs", browser.list_tabs().await);
            assert_unsupported("open_tab", browser.open_tab("ftp://x").await);
            assert_unsupported("close_tab", browser.close_tab("bad").await);
            assert_unsupported("activate_tab", browser.activate_tab("bad").await);
            assert_unsupported("bookmarks", browser.bookmarks().await);
            assert_unsupported("history", browser.history(None, 5).await);
        }

        assert_eq!(runner.invocations(), 0);
    }
}
