use crate::error::{Error, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::info;
use std::env;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html_body: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<()>;
    fn sender_name(&self) -> &'static str;
}

/// SMTP delivery via lettre. Used when APP_ENV=production.
pub struct SmtpSender {
    server: String,
    username: String,
    password: String,
    from: String,
}

impl SmtpSender {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            server: env::var("SMTP_SERVER")
                .map_err(|_| Error::Internal("SMTP_SERVER not set".to_string()))?,
            username: env::var("SMTP_USERNAME")
                .map_err(|_| Error::Internal("SMTP_USERNAME not set".to_string()))?,
            password: env::var("SMTP_PASSWORD")
                .map_err(|_| Error::Internal("SMTP_PASSWORD not set".to_string()))?,
            from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "no-reply@gatepass.events".to_string()),
        })
    }
}

#[async_trait]
impl EmailSender for SmtpSender {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        let to = match &message.to_name {
            Some(name) => format!("{} <{}>", name, message.to),
            None => message.to.clone(),
        };

        let email = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| Error::Internal(format!("invalid sender address: {}", e)))?,
            )
            .to(to
                .parse()
                .map_err(|e| Error::Internal(format!("invalid recipient address: {}", e)))?)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(message.html_body)
            .map_err(|e| Error::Internal(format!("failed to build email: {}", e)))?;

        let creds = Credentials::new(self.username.clone(), self.password.clone());
        let mailer = SmtpTransport::relay(&self.server)
            .map_err(|e| Error::Internal(format!("failed to build SMTP transport: {}", e)))?
            .credentials(creds)
            .build();

        mailer
            .send(&email)
            .map_err(|e| Error::Internal(format!("SMTP send failed: {}", e)))?;

        Ok(())
    }

    fn sender_name(&self) -> &'static str {
        "smtp"
    }
}

/// Development sender: logs instead of delivering.
pub struct LogSender;

#[async_trait]
impl EmailSender for LogSender {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        info!(
            "Would send email to {} with subject '{}'",
            message.to, message.subject
        );
        Ok(())
    }

    fn sender_name(&self) -> &'static str {
        "log"
    }
}

#[derive(Clone)]
pub struct EmailService {
    sender: Arc<dyn EmailSender>,
}

impl EmailService {
    pub fn new() -> Self {
        let env_name = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let sender: Arc<dyn EmailSender> = if env_name == "production" {
            match SmtpSender::from_env() {
                Ok(sender) => Arc::new(sender),
                Err(e) => {
                    log::warn!("SMTP not configured ({}); falling back to log sender", e);
                    Arc::new(LogSender)
                }
            }
        } else {
            Arc::new(LogSender)
        };

        Self { sender }
    }

    pub fn with_sender(sender: Arc<dyn EmailSender>) -> Self {
        Self { sender }
    }

    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<EmailService>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(EmailService::new())).clone()
    }

    pub fn sender_name(&self) -> &'static str {
        self.sender.sender_name()
    }

    pub async fn send_payment_confirmation(
        &self,
        to: &str,
        name: &str,
        event_title: &str,
        amount: &str,
        currency: &str,
        order_id: &str,
    ) -> Result<()> {
        let html_body = format!(
            "<p>Hi {},</p>\
             <p>Your payment of {} {} for <strong>{}</strong> was received.</p>\
             <p>Order reference: <code>{}</code></p>\
             <p>See you at the event!</p>",
            name, amount, currency, event_title, order_id
        );

        self.sender
            .send(EmailMessage {
                to: to.to_string(),
                to_name: Some(name.to_string()),
                subject: format!("Payment confirmed: {}", event_title),
                html_body,
            })
            .await
    }

    pub async fn send_payment_link(
        &self,
        to: &str,
        name: &str,
        event_title: &str,
        link_url: &str,
    ) -> Result<()> {
        let html_body = format!(
            "<p>Hi {},</p>\
             <p>Complete your payment for <strong>{}</strong> using the link below:</p>\
             <p><a href=\"{}\">{}</a></p>",
            name, event_title, link_url, link_url
        );

        self.sender
            .send(EmailMessage {
                to: to.to_string(),
                to_name: Some(name.to_string()),
                subject: format!("Payment link: {}", event_title),
                html_body,
            })
            .await
    }

    pub async fn send_ticket(
        &self,
        to: &str,
        name: &str,
        event_title: &str,
        qr_image_base64: &str,
    ) -> Result<()> {
        let html_body = format!(
            "<p>Hi {},</p>\
             <p>Your ticket for <strong>{}</strong> is ready. Show this QR code at the entrance:</p>\
             <p><img alt=\"ticket QR code\" src=\"data:image/svg+xml;base64,{}\" width=\"240\" height=\"240\"/></p>",
            name, event_title, qr_image_base64
        );

        self.sender
            .send(EmailMessage {
                to: to.to_string(),
                to_name: Some(name.to_string()),
                subject: format!("Your ticket: {}", event_title),
                html_body,
            })
            .await
    }

    pub async fn send_check_in_confirmation(
        &self,
        to: &str,
        name: &str,
        event_title: &str,
    ) -> Result<()> {
        let html_body = format!(
            "<p>Hi {},</p>\
             <p>You are checked in to <strong>{}</strong>. Enjoy the event!</p>",
            name, event_title
        );

        self.sender
            .send(EmailMessage {
                to: to.to_string(),
                to_name: Some(name.to_string()),
                subject: format!("Checked in: {}", event_title),
                html_body,
            })
            .await
    }
}

impl Default for EmailService {
    fn default() -> Self {
        Self::new()
    }
}
