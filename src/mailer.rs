use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::info;
use rand::Rng;

use crate::config::SmtpConfig;
use crate::error::{AppError, AppResult};

/// A plain-text email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Address replies should go to, e.g. the visitor who wrote in
    pub reply_to: Option<String>,
}

/// Outgoing email delivery
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: Email) -> AppResult<()>;
}

/// SMTP delivery through `lettre`
pub struct Mailer {
    smtp: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl Mailer {
    pub fn new(config: &SmtpConfig) -> AppResult<Self> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        // Implicit TLS on 465, STARTTLS upgrade otherwise
        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        }
        .map_err(|e| AppError::Internal(format!("invalid SMTP relay: {e}")))?;

        let smtp = builder.port(config.port).credentials(creds).build();

        Ok(Mailer {
            smtp,
            from: config.from.clone(),
        })
    }

    fn build_message(&self, email: &Email) -> AppResult<Message> {
        let mut builder = Message::builder()
            .from(parse_mailbox(&self.from)?)
            .to(parse_mailbox(&email.to)?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN);
        if let Some(reply_to) = &email.reply_to {
            builder = builder.reply_to(parse_mailbox(reply_to)?);
        }

        builder
            .body(email.body.clone())
            .map_err(|e| AppError::Internal(format!("failed to build email: {e}")))
    }
}

fn parse_mailbox(address: &str) -> AppResult<lettre::message::Mailbox> {
    address
        .parse()
        .map_err(|e| AppError::validation(format!("invalid email address '{address}': {e}")))
}

#[async_trait]
impl Notifier for Mailer {
    async fn send(&self, email: Email) -> AppResult<()> {
        let message = self.build_message(&email)?;
        self.smtp
            .send(message)
            .await
            .map_err(|e| AppError::Upstream(format!("SMTP delivery failed: {e}")))?;
        info!("Sent \"{}\" to {}", email.subject, email.to);
        Ok(())
    }
}

/// Used when SMTP is not configured; the email only reaches the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, email: Email) -> AppResult<()> {
        info!(
            "Email (not sent, SMTP disabled) to {}: {}\n{}",
            email.to, email.subject, email.body
        );
        Ok(())
    }
}

pub fn generate_reset_code() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();

    (0..8)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

pub fn password_reset_email(to: &str, reset_code: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "Password Reset Request".to_string(),
        body: format!(
            "Your admin password reset code is: {}\nThis code will expire in 1 hour.",
            reset_code
        ),
        reply_to: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_code_shape() {
        let code = generate_reset_code();
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_build_message() {
        let mailer = Mailer::new(&SmtpConfig {
            host: "smtp.example.com".into(),
            port: 465,
            username: "site@example.com".into(),
            password: "pw".into(),
            starttls: false,
            from: "Portfolio <site@example.com>".into(),
        })
        .unwrap();

        let email = Email {
            to: "owner@example.com".into(),
            subject: "Hello".into(),
            body: "Body".into(),
            reply_to: Some("visitor@example.com".into()),
        };
        assert!(mailer.build_message(&email).is_ok());

        let bad = Email {
            to: "not an address".into(),
            ..email
        };
        assert!(matches!(
            mailer.build_message(&bad),
            Err(AppError::Validation(_))
        ));
    }
}
