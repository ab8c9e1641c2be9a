//! SMTP mailer: implicit TLS (port 465), AUTH LOGIN, one message per session.
//!
//! Messages are `multipart/mixed` with a base64 text part and base64
//! attachments, so arbitrary UTF-8 content survives any relay.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use jobwatch_core::contract::{BoxError, Email, Notifier};

/// Connect, handshake and per-reply timeout.
const TIMEOUT_SECS: u64 = 30;

const EHLO_DOMAIN: &str = "jobwatch.local";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("SMTP I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SMTP server closed the connection")]
    Closed,

    #[error("SMTP error after {command}: expected {expected}xx, got {code}: {reply}")]
    Rejected {
        command: String,
        expected: u16,
        code: u16,
        reply: String,
    },
}

pub struct SmtpMailer {
    host: String,
    port: u16,
    username: String,
    password: String,
    recipient: String,
}

impl SmtpMailer {
    /// `recipient` defaults to `username` (reports to self).
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        recipient: Option<String>,
    ) -> Self {
        let username = username.into();
        let recipient = recipient.unwrap_or_else(|| username.clone());
        Self {
            host: host.into(),
            port,
            username,
            password: password.into(),
            recipient,
        }
    }

    async fn connect(&self) -> Result<tokio_rustls::client::TlsStream<TcpStream>, MailError> {
        let addr = format!("{}:{}", self.host, self.port);
        let timeout = Duration::from_secs(TIMEOUT_SECS);

        let tcp = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| MailError::Timeout(format!("TCP connection to {addr}")))?
            .map_err(|source| MailError::Connect {
                addr: addr.clone(),
                source,
            })?;

        let connector = TlsConnector::from(tls_client_config()?);
        let server_name = rustls::pki_types::ServerName::try_from(self.host.clone())
            .map_err(|e| MailError::Tls(format!("invalid server name '{}': {e}", self.host)))?;

        tokio::time::timeout(timeout, connector.connect(server_name, tcp))
            .await
            .map_err(|_| MailError::Timeout(format!("TLS handshake with {}", self.host)))?
            .map_err(|source| MailError::Connect { addr, source })
    }
}

#[async_trait]
impl Notifier for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), BoxError> {
        info!(host = %self.host, to = %email.to, subject = %email.subject, "Sending email");
        let message = build_message(email, Utc::now());
        let stream = self.connect().await?;
        deliver(
            stream,
            &self.username,
            &self.password,
            &email.from,
            &email.to,
            &message,
        )
        .await?;
        Ok(())
    }

    fn sender(&self) -> String {
        self.username.clone()
    }

    fn recipient(&self) -> String {
        self.recipient.clone()
    }
}

/// rustls config with Mozilla's root certificates.
fn tls_client_config() -> Result<Arc<ClientConfig>, MailError> {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| MailError::Tls(e.to_string()))?
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Runs one SMTP session over an established stream, from greeting to QUIT.
pub async fn deliver<S>(
    stream: S,
    username: &str,
    password: &str,
    from: &str,
    to: &str,
    message: &str,
) -> Result<(), MailError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    expect_reply(&mut reader, "greeting", 200).await?;
    command(&mut writer, &mut reader, &format!("EHLO {EHLO_DOMAIN}\r\n"), "EHLO", 200).await?;
    command(&mut writer, &mut reader, "AUTH LOGIN\r\n", "AUTH LOGIN", 300).await?;
    command(&mut writer, &mut reader, &format!("{}\r\n", b64(username.as_bytes())), "username", 300).await?;
    command(&mut writer, &mut reader, &format!("{}\r\n", b64(password.as_bytes())), "password", 200).await?;
    command(&mut writer, &mut reader, &format!("MAIL FROM:<{from}>\r\n"), "MAIL FROM", 200).await?;
    command(&mut writer, &mut reader, &format!("RCPT TO:<{to}>\r\n"), "RCPT TO", 200).await?;
    command(&mut writer, &mut reader, "DATA\r\n", "DATA", 300).await?;

    let mut payload = dot_stuff(message);
    if !payload.ends_with("\r\n") {
        payload.push_str("\r\n");
    }
    payload.push_str(".\r\n");
    command(&mut writer, &mut reader, &payload, "message body", 200).await?;

    // The message is accepted at this point; a failed QUIT changes nothing.
    if writer.write_all(b"QUIT\r\n").await.is_ok() {
        let _ = writer.flush().await;
        let _ = read_reply(&mut reader).await;
    }
    info!(to, "Email accepted by SMTP server");
    Ok(())
}

async fn command<W, R>(
    writer: &mut W,
    reader: &mut R,
    line: &str,
    name: &str,
    expected: u16,
) -> Result<(u16, Vec<String>), MailError>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    expect_reply(reader, name, expected).await
}

async fn expect_reply<R>(reader: &mut R, name: &str, expected: u16) -> Result<(u16, Vec<String>), MailError>
where
    R: AsyncBufRead + Unpin,
{
    let (code, lines) = read_reply(reader).await?;
    if code / 100 != expected / 100 {
        return Err(MailError::Rejected {
            command: name.to_string(),
            expected: expected / 100,
            code,
            reply: lines.join("; "),
        });
    }
    Ok((code, lines))
}

/// Reads one (possibly multi-line) reply: `NNN-text` continues, `NNN text` ends.
pub async fn read_reply<R>(reader: &mut R) -> Result<(u16, Vec<String>), MailError>
where
    R: AsyncBufRead + Unpin,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(TIMEOUT_SECS);
    let mut lines = Vec::new();

    loop {
        let mut line = String::new();
        let read = tokio::time::timeout_at(deadline, reader.read_line(&mut line))
            .await
            .map_err(|_| MailError::Timeout("SMTP reply".to_string()))??;
        if read == 0 {
            if lines.is_empty() {
                return Err(MailError::Closed);
            }
            break;
        }
        let trimmed = line.trim_end().to_string();
        debug!(smtp_line = %trimmed, "SMTP reply line");
        let last = trimmed.as_bytes().get(3) != Some(&b'-');
        lines.push(trimmed);
        if last {
            break;
        }
    }

    let code = lines
        .first()
        .and_then(|l| l.get(..3))
        .and_then(|c| c.parse::<u16>().ok())
        .unwrap_or(0);
    Ok((code, lines))
}

/// Renders `email` as an RFC 5322 message with CRLF line endings.
pub fn build_message(email: &Email, date: DateTime<Utc>) -> String {
    let boundary = format!("jobwatch-{}", uuid::Uuid::new_v4().simple());
    let mut out = String::new();

    let mut header = |name: &str, value: &str| {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    };
    header("From", &email.from);
    header("To", &email.to);
    header("Subject", &encode_header(&email.subject));
    header("Date", &date.to_rfc2822());
    header("Message-ID", &format!("<{}@{}>", uuid::Uuid::new_v4(), EHLO_DOMAIN));
    header("MIME-Version", "1.0");
    header(
        "Content-Type",
        &format!("multipart/mixed; boundary=\"{boundary}\""),
    );
    out.push_str("\r\n");

    out.push_str(&format!("--{boundary}\r\n"));
    out.push_str("Content-Type: text/plain; charset=UTF-8\r\n");
    out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
    out.push_str(&wrap_base64(email.body.as_bytes()));

    for attachment in &email.attachments {
        let filename = attachment.filename.replace('"', "");
        out.push_str(&format!("--{boundary}\r\n"));
        out.push_str(&format!(
            "Content-Type: {}; name=\"{filename}\"\r\n",
            attachment.content_type
        ));
        out.push_str(&format!(
            "Content-Disposition: attachment; filename=\"{filename}\"\r\n"
        ));
        out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
        out.push_str(&wrap_base64(&attachment.content));
    }

    out.push_str(&format!("--{boundary}--\r\n"));
    out
}

/// RFC 2047 encoded-word for non-ASCII header values.
fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", b64(value.as_bytes()))
    }
}

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Base64 in 76-character CRLF-terminated lines.
fn wrap_base64(bytes: &[u8]) -> String {
    let encoded = b64(bytes);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / 76 * 2 + 2);
    for chunk in encoded.as_bytes().chunks(76) {
        // Base64 output is ASCII.
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push_str("\r\n");
    }
    out
}

/// Doubles a leading `.` on every line so the body cannot end DATA early.
fn dot_stuff(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for (i, line) in message.split("\r\n").enumerate() {
        if i > 0 {
            out.push_str("\r\n");
        }
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use jobwatch_core::contract::Attachment;

    fn email() -> Email {
        Email {
            from: "me@example.com".to_string(),
            to: "you@example.com".to_string(),
            subject: "Job Scraper Report - 2025-07-01 12:00 UTC".to_string(),
            body: "3 new jobs in Bengaluru".to_string(),
            attachments: vec![Attachment {
                filename: "new_jobs_20250701_1200.json".to_string(),
                content_type: "application/json".to_string(),
                content: br#"[{"job_id":"1"}]"#.to_vec(),
            }],
        }
    }

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn message_has_headers_body_and_attachment() {
        let msg = build_message(&email(), date());

        assert!(msg.contains("From: me@example.com\r\n"));
        assert!(msg.contains("To: you@example.com\r\n"));
        assert!(msg.contains("Subject: Job Scraper Report - 2025-07-01 12:00 UTC\r\n"));
        assert!(msg.contains("Date: Tue, 1 Jul 2025 12:00:00 +0000\r\n"));
        assert!(msg.contains("Content-Type: multipart/mixed; boundary=\"jobwatch-"));
        assert!(msg.contains(&b64(b"3 new jobs in Bengaluru")));
        assert!(msg.contains("filename=\"new_jobs_20250701_1200.json\""));
        assert!(msg.contains(&b64(br#"[{"job_id":"1"}]"#)));
        assert!(msg.trim_end().ends_with("--"));
        assert!(!msg.replace("\r\n", "").contains('\n'), "bare LF in message");
    }

    #[test]
    fn non_ascii_subject_is_encoded() {
        let mut e = email();
        e.subject = "Jobs in Karnātaka".to_string();
        let msg = build_message(&e, date());
        assert!(msg.contains("Subject: =?UTF-8?B?"));
    }

    #[test]
    fn base64_lines_are_wrapped() {
        let wrapped = wrap_base64(&[b'x'; 200]);
        assert!(wrapped.split("\r\n").all(|l| l.len() <= 76));
    }

    #[test]
    fn leading_dots_are_stuffed() {
        assert_eq!(dot_stuff(".hidden\r\nok\r\n..two"), "..hidden\r\nok\r\n...two");
    }

    #[tokio::test]
    async fn reads_multiline_reply() {
        let mut reader = BufReader::new(&b"250-smtp.example.com\r\n250-AUTH LOGIN\r\n250 OK\r\n"[..]);
        let (code, lines) = read_reply(&mut reader).await.unwrap();
        assert_eq!(code, 250);
        assert_eq!(lines.len(), 3);
    }

    #[tokio::test]
    async fn closed_connection_is_an_error() {
        let mut reader = BufReader::new(&b""[..]);
        assert!(matches!(read_reply(&mut reader).await, Err(MailError::Closed)));
    }

    /// Scripted SMTP server on the far end of an in-memory pipe.
    async fn fake_server(
        stream: tokio::io::DuplexStream,
        auth_reply: &'static str,
    ) -> Vec<String> {
        let (r, mut w) = tokio::io::split(stream);
        let mut reader = BufReader::new(r);
        let mut seen = Vec::new();
        w.write_all(b"220 smtp.example.com ready\r\n").await.unwrap();

        let mut in_data = false;
        let mut auth_step = 0;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap() == 0 {
                break;
            }
            let line = line.trim_end().to_string();
            seen.push(line.clone());

            if in_data {
                if line == "." {
                    in_data = false;
                    w.write_all(b"250 queued\r\n").await.unwrap();
                }
                continue;
            }

            let reply: &str = if auth_step == 1 {
                auth_step = 2;
                "334 UGFzc3dvcmQ6\r\n"
            } else if auth_step == 2 {
                auth_step = 0;
                auth_reply
            } else if line.starts_with("EHLO") {
                "250-smtp.example.com\r\n250 AUTH LOGIN\r\n"
            } else if line == "AUTH LOGIN" {
                auth_step = 1;
                "334 VXNlcm5hbWU6\r\n"
            } else if line == "DATA" {
                in_data = true;
                "354 go ahead\r\n"
            } else if line == "QUIT" {
                w.write_all(b"221 bye\r\n").await.unwrap();
                break;
            } else {
                "250 OK\r\n"
            };
            w.write_all(reply.as_bytes()).await.unwrap();
            if reply.starts_with("535") {
                break;
            }
        }
        seen
    }

    #[tokio::test]
    async fn delivers_through_full_dialogue() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let server = tokio::spawn(fake_server(server, "235 accepted\r\n"));

        let message = build_message(&email(), date());
        deliver(client, "me@example.com", "app-password", "me@example.com", "you@example.com", &message)
            .await
            .expect("delivery should succeed");

        let seen = server.await.unwrap();
        assert_eq!(seen[0], format!("EHLO {EHLO_DOMAIN}"));
        assert_eq!(seen[2], b64(b"me@example.com"));
        assert_eq!(seen[3], b64(b"app-password"));
        assert!(seen.contains(&"MAIL FROM:<me@example.com>".to_string()));
        assert!(seen.contains(&"RCPT TO:<you@example.com>".to_string()));
        assert!(seen.contains(&"Subject: Job Scraper Report - 2025-07-01 12:00 UTC".to_string()));
        assert_eq!(seen.last().map(String::as_str), Some("QUIT"));
    }

    #[tokio::test]
    async fn rejected_login_is_reported() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let server = tokio::spawn(fake_server(server, "535 5.7.8 Username and Password not accepted\r\n"));

        let err = deliver(client, "me@example.com", "wrong", "me@example.com", "me@example.com", "x")
            .await
            .unwrap_err();
        match err {
            MailError::Rejected { command, code, .. } => {
                assert_eq!(command, "password");
                assert_eq!(code, 535);
            }
            other => panic!("unexpected error: {other}"),
        }
        let _ = server.await;
    }
}
