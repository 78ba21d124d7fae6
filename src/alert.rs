//! E-mail alerts for INFO and STATUS traffic.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::debug;

use crate::config::SmtpConfig;

/// Errors from sending an alert.
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Something that can deliver a short alert.
#[async_trait]
pub trait Alerter: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<(), AlertError>;
}

/// Alert bodies go to pagers and SMS gateways, which mangle spaces.
pub fn alert_body(text: &str) -> String {
    text.replace(' ', ".")
}

/// Plain SMTP delivery, with login when a user and password are set.
pub struct SmtpAlerter {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpAlerter {
    pub fn new(config: &SmtpConfig) -> Result<Self, AlertError> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host).port(config.port);
        if !config.user.is_empty() && !config.password.is_empty() {
            debug!("Using SMTP auth as {}", config.user);
            builder = builder.credentials(Credentials::new(
                config.user.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from: config.mail_from.parse()?,
            to: config.mail_to.parse()?,
        })
    }

    fn message(&self, subject: &str, body: &str) -> Result<Message, AlertError> {
        Ok(Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .body(body.to_string())?)
    }
}

#[async_trait]
impl Alerter for SmtpAlerter {
    async fn send(&self, subject: &str, body: &str) -> Result<(), AlertError> {
        let message = self.message(subject, body)?;
        self.transport.send(message).await?;
        debug!("Alert '{}' sent to {}", subject, self.to);
        Ok(())
    }
}
