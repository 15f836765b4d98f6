//! Mail notification boundary
//!
//! Scripts build a [`MailMessage`] from their `Mail*` variables and hand it
//! to a [`MailTransport`]. Delivery itself is left to a local submission
//! program (`sendmail -t` and friends).

use crate::error::{Result, RustMtapeError};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{debug, info};

pub const DEFAULT_SMTP_PORT: u16 = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(RustMtapeError::parameter_validation("MailHost is not set"));
        }
        if self.sender.is_empty() {
            return Err(RustMtapeError::parameter_validation("MailSender is not set"));
        }
        if self.recipient.is_empty() {
            return Err(RustMtapeError::parameter_validation(
                "MailRecipient is not set",
            ));
        }
        Ok(())
    }

    /// RFC 5322 text of the message
    pub fn to_rfc5322(&self) -> String {
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\nX-Mailer: rustmtape\r\n\r\n{}\r\n",
            self.sender,
            self.recipient,
            self.subject,
            chrono::Local::now().to_rfc2822(),
            self.body.replace('\n', "\r\n")
        )
    }
}

pub trait MailTransport: Send {
    fn send(&self, message: &MailMessage) -> Result<()>;
}

/// Pipes the message into a local mail submission command.
///
/// Relaying is the submission program's job. The script's relay settings
/// reach it as `MTAPE_MAIL_HOST`, `MTAPE_MAIL_PORT`, `MTAPE_MAIL_USER` and
/// `MTAPE_MAIL_PASSWORD` in its environment.
#[derive(Debug, Clone)]
pub struct CommandMailer {
    argv: Vec<String>,
}

impl CommandMailer {
    pub fn new(argv: Vec<String>) -> Result<Self> {
        if argv.is_empty() {
            return Err(RustMtapeError::config("mail_command is empty"));
        }
        Ok(Self { argv })
    }
}

impl MailTransport for CommandMailer {
    fn send(&self, message: &MailMessage) -> Result<()> {
        message.validate()?;
        debug!(
            "Submitting mail via {} (relay {}:{})",
            self.argv[0], message.host, message.port
        );

        let mut child = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .env("MTAPE_MAIL_HOST", &message.host)
            .env("MTAPE_MAIL_PORT", message.port.to_string())
            .env("MTAPE_MAIL_USER", &message.user)
            .env("MTAPE_MAIL_PASSWORD", &message.password)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                RustMtapeError::file_operation(format!("cannot start {}: {}", self.argv[0], e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(message.to_rfc5322().as_bytes())?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(RustMtapeError::file_operation(format!(
                "{} exited with {}: {}",
                self.argv[0],
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        info!("Mail sent to {}", message.recipient);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> MailMessage {
        MailMessage {
            host: "smtp.example.com".to_string(),
            port: DEFAULT_SMTP_PORT,
            user: String::new(),
            password: String::new(),
            sender: "backup@example.com".to_string(),
            recipient: "ops@example.com".to_string(),
            subject: "Tape".to_string(),
            body: "VOL_0001 full".to_string(),
        }
    }

    #[test]
    fn test_validate_requires_addresses() {
        assert!(message().validate().is_ok());

        let mut missing = message();
        missing.recipient.clear();
        assert!(missing.validate().is_err());
    }

    #[test]
    fn test_rfc5322_headers() {
        let text = message().to_rfc5322();
        assert!(text.starts_with("From: backup@example.com\r\nTo: ops@example.com\r\n"));
        assert!(text.contains("Subject: Tape\r\n"));
        assert!(text.ends_with("VOL_0001 full\r\n"));
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(CommandMailer::new(Vec::new()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_mailer_pipes_message() {
        let mailer = CommandMailer::new(vec!["cat".to_string()]).unwrap();
        assert!(mailer.send(&message()).is_ok());

        let failing = CommandMailer::new(vec!["false".to_string()]).unwrap();
        assert!(failing.send(&message()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_mailer_exports_relay() {
        let check = "cat >/dev/null; test \"$MTAPE_MAIL_HOST:$MTAPE_MAIL_PORT\" = smtp.example.com:25";
        let mailer =
            CommandMailer::new(vec!["sh".to_string(), "-c".to_string(), check.to_string()])
                .unwrap();
        assert!(mailer.send(&message()).is_ok());

        let mut other = message();
        other.host = "relay.example.org".to_string();
        assert!(mailer.send(&other).is_err());
    }
}
