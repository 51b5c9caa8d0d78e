//! Mail.app adapter
//!
//! Messages are addressed by mailbox name, optional account name and the
//! numeric message id Mail assigns within that mailbox. Without an account
//! every account is searched for a mailbox of that name.

use std::sync::Arc;
use tracing::info;

use super::require_text;
use crate::bridge::Bridge;
use crate::bridge::escape::quote;
use crate::bridge::records::{FIELD_SEP, Field, RECORD_SEP, Record, RecordSchema};
use crate::bridge::richtext::to_plain_text;
use crate::bridge::script::{Create, Filter, Locate, Properties, Query, Script, Value};
use crate::error::{BridgeError, Result};
use crate::types::{Mailbox, Message};

const APP: &str = "Mail";

pub const DEFAULT_MAILBOX: &str = "INBOX";

static MAILBOXES: RecordSchema = RecordSchema {
    name: "mailbox",
    record_sep: RECORD_SEP,
    field_sep: FIELD_SEP,
    min_fields: 3,
    fields: &[
        Field::text("name", "name of rec"),
        Field::text("account", "name of acct"),
        Field::text("unread", "unread count of rec"),
    ],
};

static MESSAGES: RecordSchema = RecordSchema {
    name: "message",
    record_sep: RECORD_SEP,
    field_sep: FIELD_SEP,
    min_fields: 6,
    fields: &[
        Field::text("id", "id of rec"),
        Field::text("mailbox", "name of mailbox of rec"),
        Field::text("account", "name of acct"),
        Field::text("subject", "subject of rec"),
        Field::text("sender", "sender of rec"),
        Field::date("received", "date received of rec"),
        Field::text("read", "read status of rec"),
        Field::text("flagged", "flagged status of rec"),
    ],
};

static MESSAGE_WITH_BODY: RecordSchema = RecordSchema {
    name: "message_body",
    record_sep: RECORD_SEP,
    field_sep: FIELD_SEP,
    min_fields: 9,
    fields: &[
        Field::text("id", "id of rec"),
        Field::text("mailbox", "name of mailbox of rec"),
        Field::text("account", "name of acct"),
        Field::text("subject", "subject of rec"),
        Field::text("sender", "sender of rec"),
        Field::date("received", "date received of rec"),
        Field::text("read", "read status of rec"),
        Field::text("flagged", "flagged status of rec"),
        Field::text("body", "content of rec"),
    ],
};

#[derive(Debug, Clone)]
pub struct MessageQuery {
    pub mailbox: String,
    pub account: Option<String>,
    pub unread_only: bool,
    /// Substring of the subject or sender
    pub search: Option<String>,
    pub limit: usize,
}

impl Default for MessageQuery {
    fn default() -> Self {
        Self {
            mailbox: DEFAULT_MAILBOX.to_string(),
            account: None,
            unread_only: false,
            search: None,
            limit: 20,
        }
    }
}

/// Address of one message
#[derive(Debug, Clone)]
pub struct MessageRef {
    pub mailbox: String,
    pub account: Option<String>,
    pub id: i64,
}

#[derive(Debug, Clone, Default)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    /// Sending address; Mail's default account when `None`
    pub sender: Option<String>,
}

pub struct Mail {
    bridge: Arc<Bridge>,
}

impl Mail {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }

    pub async fn list_mailboxes(&self) -> Result<Vec<Mailbox>> {
        self.bridge.check_platform()?;
        let mut script = Script::tell(APP);
        script.query(&Query::new("mailboxes of acct").within("accounts", "acct"), &MAILBOXES);
        let records = self.bridge.fetch(&script.build(), &MAILBOXES).await?;
        records
            .iter()
            .map(|r| {
                Ok(Mailbox {
                    name: r.text("name"),
                    account: r.text("account"),
                    unread: r.int("unread")?,
                })
            })
            .collect()
    }

    pub async fn list_messages(&self, query: &MessageQuery) -> Result<Vec<Message>> {
        self.bridge.check_platform()?;
        require_text(&query.mailbox, "Mailbox")?;

        let filter = Filter::all(
            [
                query
                    .unread_only
                    .then(|| Filter::equals("read status", Value::Bool(false))),
                query.search.as_deref().filter(|s| !s.is_empty()).map(|s| {
                    Filter::Or(vec![
                        Filter::contains("subject", s),
                        Filter::contains("sender", s),
                    ])
                }),
            ]
            .into_iter()
            .flatten(),
        );

        let mut script = Script::tell(APP);
        script.query(
            &Query::new(format!("messages of mailbox {} of acct", quote(&query.mailbox)))
                .filter(filter)
                .within(accounts(query.account.as_deref()), "acct")
                .required(format!("Mailbox {}", query.mailbox))
                .limit(query.limit),
            &MESSAGES,
        );
        let records = self.bridge.fetch(&script.build(), &MESSAGES).await?;
        records.iter().map(|r| map_message(r, None)).collect()
    }

    /// Full message with its body as plain text
    pub async fn read_message(&self, message: &MessageRef) -> Result<Message> {
        self.bridge.check_platform()?;
        let mut script = Script::tell(APP);
        script
            .locate(&find_message(message)?)
            .returning(&MESSAGE_WITH_BODY);
        let record = self
            .bridge
            .fetch_one(&script.build(), &MESSAGE_WITH_BODY)
            .await?;
        let body = to_plain_text(&record.text("body"));
        map_message(&record, Some(body))
    }

    pub async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        self.bridge.check_platform()?;
        if mail.to.is_empty() && mail.cc.is_empty() && mail.bcc.is_empty() {
            return Err(BridgeError::invalid_input("At least one recipient is required"));
        }
        for address in mail.to.iter().chain(&mail.cc).chain(&mail.bcc) {
            if !address.contains('@') {
                return Err(BridgeError::invalid_input(format!(
                    "Not an email address: {}",
                    address
                )));
            }
        }

        let props = Properties::new()
            .text("subject", &mail.subject)
            .text("content", &mail.body)
            .set("visible", Value::Bool(false))
            .opt_text("sender", mail.sender.as_deref());
        let mut script = Script::tell(APP);
        script.create(&Create::new("outgoing message", props));
        for (class, list, addresses) in [
            ("to recipient", "to recipients", &mail.to),
            ("cc recipient", "cc recipients", &mail.cc),
            ("bcc recipient", "bcc recipients", &mail.bcc),
        ] {
            for address in addresses {
                script.line(format!(
                    "make new {} at end of {} of rec with properties {{address:{}}}",
                    class,
                    list,
                    quote(address)
                ));
            }
        }
        script.line("send rec").returning_nothing();
        self.bridge.run(&script.build()).await?;
        info!(
            "Sent '{}' to {} recipient(s)",
            mail.subject,
            mail.to.len() + mail.cc.len() + mail.bcc.len()
        );
        Ok(())
    }

    pub async fn set_read(&self, message: &MessageRef, read: bool) -> Result<Message> {
        self.set_status(message, "read status", read).await
    }

    pub async fn set_flagged(&self, message: &MessageRef, flagged: bool) -> Result<Message> {
        self.set_status(message, "flagged status", flagged).await
    }

    /// Moves the message to the account's trash
    pub async fn delete_message(&self, message: &MessageRef) -> Result<()> {
        self.bridge.check_platform()?;
        let mut script = Script::tell(APP);
        script
            .locate(&find_message(message)?)
            .line("delete rec")
            .returning_nothing();
        self.bridge.run(&script.build()).await?;
        info!("Deleted message {} from {}", message.id, message.mailbox);
        Ok(())
    }

    async fn set_status(
        &self,
        message: &MessageRef,
        property: &'static str,
        value: bool,
    ) -> Result<Message> {
        self.bridge.check_platform()?;
        let mut script = Script::tell(APP);
        script
            .locate(&find_message(message)?)
            .assign(&Properties::new().set(property, Value::Bool(value)))
            .returning(&MESSAGES);
        let record = self.bridge.fetch_one(&script.build(), &MESSAGES).await?;
        map_message(&record, None)
    }
}

fn accounts(account: Option<&str>) -> String {
    match account {
        Some(name) => format!("accounts whose name is {}", quote(name)),
        None => "accounts".to_string(),
    }
}

fn find_message(message: &MessageRef) -> Result<Locate> {
    require_text(&message.mailbox, "Mailbox")?;
    if message.id <= 0 {
        return Err(BridgeError::invalid_input(format!(
            "Invalid message id: {}",
            message.id
        )));
    }
    Ok(Locate::new(
        format!("messages of mailbox {} of acct", quote(&message.mailbox)),
        Filter::equals("id", Value::Int(message.id)),
        format!("Message {} in {}", message.id, message.mailbox),
    )
    .within(accounts(message.account.as_deref()), "acct"))
}

fn map_message(r: &Record, body: Option<String>) -> Result<Message> {
    Ok(Message {
        id: r.int("id")?,
        mailbox: r.text("mailbox"),
        account: r.text("account"),
        subject: r.text("subject"),
        sender: r.text("sender"),
        received: r.date("received")?,
        read: r.bool("read")?,
        flagged: r.bool("flagged")?,
        body,
    })
}
