use crate::config::MailConfig;
use crate::models::User;
use lettre::message::{header::ContentType, Mailbox};
use lettre::{Message, SmtpTransport, Transport};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Invalid mail address: '{0}'")]
    Address(String),
    #[error("No recipients for '{0}'")]
    NoRecipients(String),
    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// A plain-text message ready to hand to a [`MailSender`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

pub trait MailSender: Send + Sync {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

pub type Mailer = Arc<dyn MailSender>;

/// Plain SMTP without TLS, for a relay on the same host.
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|_| MailError::Address(config.from.clone()))?;
        let transport = SmtpTransport::builder_dangerous(config.host.as_str())
            .port(config.port)
            .build();
        Ok(SmtpMailer { transport, from })
    }
}

impl MailSender for SmtpMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        if mail.to.is_empty() {
            return Err(MailError::NoRecipients(mail.subject.clone()));
        }
        let mut builder = Message::builder().from(self.from.clone());
        for to in &mail.to {
            let mailbox = to.parse::<Mailbox>().map_err(|_| MailError::Address(to.clone()))?;
            builder = builder.to(mailbox);
        }
        let message = builder
            .subject(mail.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.clone())?;
        self.transport.send(&message)?;
        log::info!("Sent '{}' to {} recipient(s)", mail.subject, mail.to.len());
        Ok(())
    }
}

/// Request details attached to error reports.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub method: String,
    pub uri: String,
    pub status: u16,
    pub user_agent: String,
    pub referer: String,
    pub peer_addr: String,
    pub real_ip: String,
}

impl fmt::Display for RequestInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} referer: {} remote_addr: {} | {}",
            self.method, self.uri, self.status, self.user_agent, self.referer, self.peer_addr, self.real_ip
        )
    }
}

pub fn error_report(error: &str, request: &RequestInfo, recipients: &[String]) -> OutgoingMail {
    OutgoingMail {
        to: recipients.to_vec(),
        subject: format!("[magazine][error {}] {}", request.status, request.uri),
        body: format!(
            "Error: {}\n\nRequest:\n\n{}\n\nURI: {}\nIP: {}\n",
            error, request, request.uri, request.peer_addr
        ),
    }
}

pub fn password_reset(user: &User, password: &str) -> OutgoingMail {
    OutgoingMail {
        to: vec![user.email.clone()],
        subject: "Password reset".to_string(),
        body: format!(
            "Hello, {} {}!\n\nYour password has been reset. The new password is:\n\n{}\n\nPlease change it after logging in.\n",
            user.first_name, user.last_name, password
        ),
    }
}

/// Tells the editors about a new mailing-list member, with the list's reply.
pub fn subscription_notice(email: &str, language: &str, response: &serde_json::Value, recipients: &[String]) -> OutgoingMail {
    let details = serde_json::to_string_pretty(response).unwrap_or_else(|_| response.to_string());
    OutgoingMail {
        to: recipients.to_vec(),
        subject: format!("[magazine][new subscriber] {}", email),
        body: format!("Email: {}\nLanguage: {}\n\nList response:\n{}\n", email, language, details),
    }
}
