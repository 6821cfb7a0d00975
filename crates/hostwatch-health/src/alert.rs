//! Failure alerts.
//!
//! One HTML message per unhealthy cycle, delivered independently to every
//! recipient. Delivery is best-effort: failures are logged and dropped.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use askama::Template;
use hostwatch_state::HealthVerdict;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{error, info};

use crate::probe::BoxFuture;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("failed to start mailer: {0}")]
    Spawn(String),

    #[error("mailer i/o error: {0}")]
    Io(String),

    #[error("mailer exited with {0}")]
    ExitStatus(String),

    #[error("mailer timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to render alert body: {0}")]
    Render(String),
}

#[derive(Template)]
#[template(path = "alert.html")]
struct AlertTemplate<'a> {
    server_name: &'a str,
    issues: &'a [String],
    checked_at: &'a str,
}

/// One outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Outbound mail transport.
pub trait Mailer: Send + Sync {
    fn send<'a>(&'a self, message: &'a AlertMessage) -> BoxFuture<'a, Result<(), AlertError>>;
}

/// Pipes messages into `sendmail -t -i`.
#[derive(Debug, Clone)]
pub struct SendmailMailer {
    path: PathBuf,
    from: String,
    timeout: Duration,
}

impl SendmailMailer {
    pub fn new(path: impl Into<PathBuf>, from: impl Into<String>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            from: from.into(),
            timeout,
        }
    }

    /// RFC 822 message with an HTML body.
    pub fn render(&self, message: &AlertMessage) -> String {
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/html; charset=UTF-8\r\n\r\n{}\r\n",
            self.from, message.to, message.subject, message.html_body
        )
    }

    /// The whole exchange (spawn, body write, exit) is bounded by the
    /// timeout; the child is killed when it runs out.
    async fn deliver(&self, message: &AlertMessage) -> Result<(), AlertError> {
        tokio::time::timeout(self.timeout, self.pipe(message))
            .await
            .map_err(|_| AlertError::Timeout(self.timeout))?
    }

    async fn pipe(&self, message: &AlertMessage) -> Result<(), AlertError> {
        let mut child = Command::new(&self.path)
            .args(["-t", "-i"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AlertError::Spawn(e.to_string()))?;

        let raw = self.render(message);
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AlertError::Io("stdin not captured".to_string()))?;
        stdin
            .write_all(raw.as_bytes())
            .await
            .map_err(|e| AlertError::Io(e.to_string()))?;
        drop(stdin);

        let status = child
            .wait()
            .await
            .map_err(|e| AlertError::Io(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(AlertError::ExitStatus(status.to_string()))
        }
    }
}

impl Mailer for SendmailMailer {
    fn send<'a>(&'a self, message: &'a AlertMessage) -> BoxFuture<'a, Result<(), AlertError>> {
        Box::pin(self.deliver(message))
    }
}

/// Logs alerts instead of sending them (no sender configured).
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send<'a>(&'a self, message: &'a AlertMessage) -> BoxFuture<'a, Result<(), AlertError>> {
        Box::pin(async move {
            info!(to = %message.to, subject = %message.subject, "alert not mailed (no sender configured)");
            Ok(())
        })
    }
}

/// Formats and fans out failure alerts.
#[derive(Clone)]
pub struct AlertDispatcher {
    mailer: Arc<dyn Mailer>,
    server_name: String,
}

impl AlertDispatcher {
    /// Label messages with this machine's hostname.
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        let host = gethostname::gethostname().to_string_lossy().into_owned();
        Self::with_host(mailer, &host)
    }

    pub fn with_host(mailer: Arc<dyn Mailer>, host: &str) -> Self {
        let host = if host.is_empty() { "unknown-host" } else { host };
        Self {
            mailer,
            server_name: format!("Server: {host} Health Check"),
        }
    }

    pub fn subject(&self) -> String {
        format!("[ALERT] {} - Health Check Failed", self.server_name)
    }

    pub fn html_body(&self, verdict: &HealthVerdict) -> Result<String, AlertError> {
        AlertTemplate {
            server_name: &self.server_name,
            issues: verdict.issues(),
            checked_at: verdict.checked_at(),
        }
        .render()
        .map_err(|e| AlertError::Render(e.to_string()))
    }

    /// Send one message per recipient for an unhealthy verdict. Returns the
    /// number delivered; failures are logged, never retried.
    pub async fn notify(&self, verdict: &HealthVerdict, recipients: &[String]) -> usize {
        if verdict.is_ok() || recipients.is_empty() {
            return 0;
        }

        let subject = self.subject();
        let html_body = match self.html_body(verdict) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "alert not sent");
                return 0;
            }
        };
        let mut delivered = 0;

        for to in recipients {
            let message = AlertMessage {
                to: to.clone(),
                subject: subject.clone(),
                html_body: html_body.clone(),
            };
            match self.mailer.send(&message).await {
                Ok(()) => {
                    delivered += 1;
                    info!(%to, issues = verdict.issues().len(), "alert sent");
                }
                Err(e) => error!(%to, error = %e, "alert delivery failed"),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingMailer;

    fn unhealthy() -> HealthVerdict {
        HealthVerdict::new(
            vec![
                "Docker: redis not running".to_string(),
                "Supervisor: web <FATAL> & gone".to_string(),
            ],
            "2024-01-01T00:00:00Z",
            480,
        )
    }

    fn recipients() -> Vec<String> {
        vec!["ops@example.com".to_string(), "oncall@example.com".to_string()]
    }

    #[tokio::test]
    async fn one_message_per_recipient() {
        let mailer = Arc::new(RecordingMailer::default());
        let dispatcher = AlertDispatcher::with_host(mailer.clone(), "web-1");

        let delivered = dispatcher.notify(&unhealthy(), &recipients()).await;

        assert_eq!(delivered, 2);
        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "ops@example.com");
        assert_eq!(sent[1].to, "oncall@example.com");
        assert_eq!(
            sent[0].subject,
            "[ALERT] Server: web-1 Health Check - Health Check Failed"
        );
        assert_eq!(sent[0].html_body, sent[1].html_body);
    }

    #[tokio::test]
    async fn body_lists_escaped_issues_and_timestamp() {
        let dispatcher = AlertDispatcher::with_host(Arc::new(LogMailer), "web-1");
        let body = dispatcher.html_body(&unhealthy()).unwrap();

        assert_eq!(
            body.trim_end(),
            "<p>Health check on <strong>Server: web-1 Health Check</strong> failed:</p><ul>\
             <li>Docker: redis not running</li>\
             <li>Supervisor: web &lt;FATAL&gt; &amp; gone</li>\
             </ul><p>Checked at: 2024-01-01T00:00:00Z</p>"
        );
    }

    #[tokio::test]
    async fn ok_verdict_or_no_recipients_sends_nothing() {
        let mailer = Arc::new(RecordingMailer::default());
        let dispatcher = AlertDispatcher::with_host(mailer.clone(), "web-1");

        let ok = HealthVerdict::new(vec![], "2024-01-01T00:00:00Z", 480);
        assert_eq!(dispatcher.notify(&ok, &recipients()).await, 0);
        assert_eq!(dispatcher.notify(&unhealthy(), &[]).await, 0);
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn failed_delivery_does_not_stop_others() {
        let mailer = Arc::new(RecordingMailer::failing_for("ops@example.com"));
        let dispatcher = AlertDispatcher::with_host(mailer.clone(), "web-1");

        let delivered = dispatcher.notify(&unhealthy(), &recipients()).await;

        assert_eq!(delivered, 1);
        assert_eq!(mailer.sent().len(), 1);
        assert_eq!(mailer.sent()[0].to, "oncall@example.com");
    }

    #[tokio::test]
    async fn missing_sendmail_is_spawn_error() {
        let mailer = SendmailMailer::new(
            "/nonexistent/hostwatch/sendmail",
            "hostwatch@example.com",
            Duration::from_secs(1),
        );
        let message = AlertMessage {
            to: "ops@example.com".to_string(),
            subject: "s".to_string(),
            html_body: "<p>b</p>".to_string(),
        };
        assert!(matches!(mailer.send(&message).await, Err(AlertError::Spawn(_))));
    }

    #[tokio::test]
    async fn stalled_sendmail_times_out_while_writing_body() {
        use std::os::unix::fs::PermissionsExt;

        // Never reads stdin, so a large body blocks the write.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("sendmail");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mailer = SendmailMailer::new(
            &script,
            "hostwatch@example.com",
            Duration::from_millis(300),
        );
        let message = AlertMessage {
            to: "ops@example.com".to_string(),
            subject: "s".to_string(),
            html_body: "x".repeat(1024 * 1024),
        };

        let started = std::time::Instant::now();
        let result = mailer.send(&message).await;
        assert!(matches!(result, Err(AlertError::Timeout(_))), "got {result:?}");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn sendmail_render_has_headers() {
        let mailer = SendmailMailer::new(
            "/usr/sbin/sendmail",
            "hostwatch@example.com",
            Duration::from_secs(1),
        );
        let raw = mailer.render(&AlertMessage {
            to: "ops@example.com".to_string(),
            subject: "[ALERT] x".to_string(),
            html_body: "<p>b</p>".to_string(),
        });
        assert!(raw.starts_with("From: hostwatch@example.com\r\nTo: ops@example.com\r\n"));
        assert!(raw.contains("Content-Type: text/html; charset=UTF-8\r\n\r\n<p>b</p>"));
    }

    #[test]
    fn empty_hostname_gets_placeholder() {
        let dispatcher = AlertDispatcher::with_host(Arc::new(LogMailer), "");
        assert!(dispatcher.subject().contains("unknown-host"));
    }
}
