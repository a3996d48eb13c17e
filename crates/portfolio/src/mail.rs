//! Contact form relay.
//!
//! Contact submissions are validated here and handed to a [`MailProvider`].
//! The provider is an external collaborator: its failures are opaque and
//! only their message is passed back to the caller.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde_json::Value;
use tracing::info;

use crate::config::MailConfig;
use crate::error::{Error, Result};

/// A validated contact form submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactMessage {
    /// Visitor's name.
    pub name: String,
    /// Visitor's email address, used as sender and reply-to.
    pub email: String,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub message: String,
}

impl ContactMessage {
    /// Read a submission from a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if any of the four fields is missing,
    /// empty, or not a string.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let field = |key: &str| match payload.get(key) {
            Some(Value::String(value)) if !value.is_empty() => Some(value.clone()),
            _ => None,
        };

        match (
            field("name"),
            field("email"),
            field("subject"),
            field("message"),
        ) {
            (Some(name), Some(email), Some(subject), Some(message)) => Ok(Self {
                name,
                email,
                subject,
                message,
            }),
            _ => Err(Error::invalid_input("Missing fields")),
        }
    }

    /// HTML rendition of the message for mail clients.
    #[must_use]
    pub fn html_body(&self) -> String {
        format!(
            "<p><strong>Name:</strong> {}</p>\n\
             <p><strong>Email:</strong> {}</p>\n\
             <p><strong>Message:</strong><br/>{}</p>\n",
            escape_html(&self.name),
            escape_html(&self.email),
            escape_html(&self.message).replace('\n', "<br/>"),
        )
    }
}

/// A mail ready to hand to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    /// Display name of the sender.
    pub from_name: String,
    /// Sender address.
    pub from_email: String,
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub text: String,
    /// HTML body.
    pub html: String,
}

/// Something that can deliver mail.
#[async_trait]
pub trait MailProvider: Send + Sync + fmt::Debug {
    /// Deliver one mail.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MailProvider`] if delivery fails.
    async fn send(&self, mail: &OutgoingMail) -> Result<()>;
}

/// SMTP delivery through an authenticated relay.
pub struct SmtpMailer {
    host: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl SmtpMailer {
    /// Build a mailer from configuration.
    ///
    /// Returns `Ok(None)` when no SMTP credentials are configured.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the relay host is unusable.
    pub fn from_config(config: &MailConfig) -> Result<Option<Self>> {
        let (Some(username), Some(password)) = (&config.username, &config.password) else {
            return Ok(None);
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|err| Error::configuration(format!("invalid SMTP relay: {err}")))?
            .port(config.smtp_port)
            .credentials(Credentials::new(username.clone(), password.clone()))
            .build();

        Ok(Some(Self {
            host: config.smtp_host.clone(),
            transport,
        }))
    }
}

#[async_trait]
impl MailProvider for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        let message = build_message(mail)?;
        self.transport
            .send(message)
            .await
            .map_err(|err| Error::mail_provider(err.to_string()))?;
        Ok(())
    }
}

fn build_message(mail: &OutgoingMail) -> Result<Message> {
    let from_address: Address = mail
        .from_email
        .parse()
        .map_err(|err| Error::mail_provider(format!("invalid sender address: {err}")))?;
    let to_address: Address = mail
        .to
        .parse()
        .map_err(|err| Error::configuration(format!("invalid contact address: {err}")))?;
    let sender = Mailbox::new(Some(mail.from_name.clone()), from_address);

    Message::builder()
        .from(sender.clone())
        .reply_to(sender)
        .to(Mailbox::new(None, to_address))
        .subject(mail.subject.clone())
        .multipart(MultiPart::alternative_plain_html(
            mail.text.clone(),
            mail.html.clone(),
        ))
        .map_err(|err| Error::mail_provider(err.to_string()))
}

/// Validates contact submissions and relays them to the site owner.
#[derive(Debug, Clone)]
pub struct ContactRelay {
    provider: Option<Arc<dyn MailProvider>>,
    recipient: Option<String>,
}

impl ContactRelay {
    /// Create a relay. Missing pieces are reported when a message is sent.
    #[must_use]
    pub fn new(provider: Option<Arc<dyn MailProvider>>, recipient: Option<String>) -> Self {
        Self {
            provider,
            recipient,
        }
    }

    /// Build the relay described by the mail configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the SMTP relay cannot be set up.
    pub fn from_config(config: &MailConfig) -> Result<Self> {
        let provider = SmtpMailer::from_config(config)?
            .map(|mailer| Arc::new(mailer) as Arc<dyn MailProvider>);
        Ok(Self::new(provider, config.contact_email.clone()))
    }

    /// Validate a payload and relay it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for incomplete payloads (the provider
    /// is not called), a configuration error when the relay is not set up,
    /// and [`Error::MailProvider`] when delivery fails.
    pub async fn send_payload(&self, payload: &Value) -> Result<()> {
        let message = ContactMessage::from_payload(payload)?;
        self.send(&message).await
    }

    /// Relay a validated message.
    ///
    /// # Errors
    ///
    /// See [`send_payload`](Self::send_payload).
    pub async fn send(&self, message: &ContactMessage) -> Result<()> {
        let recipient = self
            .recipient
            .as_deref()
            .ok_or_else(|| Error::configuration("contact email is not set"))?;
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| Error::configuration("mail provider is not configured"))?;

        let mail = OutgoingMail {
            from_name: message.name.clone(),
            from_email: message.email.clone(),
            to: recipient.to_string(),
            subject: message.subject.clone(),
            text: message.message.clone(),
            html: message.html_body(),
        };

        provider.send(&mail).await?;

        info!(subject = %message.subject, "Relayed contact message");
        Ok(())
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
