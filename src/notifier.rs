use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::sync::{Arc, Mutex};

use crate::config::SmtpConfig;

/// ConfirmationEmail
///
/// Everything needed to tell a user their confirmation code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationEmail {
    pub username: String,
    pub email: String,
    pub code: String,
}

impl ConfirmationEmail {
    pub const SUBJECT: &'static str = "YamDB confirmation code";

    pub fn body(&self) -> String {
        format!(
            "Hello, {}!\n\nUse this confirmation code to obtain your API token: {}\n",
            self.username, self.code
        )
    }
}

// 1. Notifier Contract
/// Notifier
///
/// Delivers confirmation codes out of band. Handlers never await delivery
/// directly: they go through [`dispatch`], so a slow or broken mail relay
/// cannot fail a signup.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_confirmation(&self, message: &ConfirmationEmail) -> Result<(), String>;
}

/// NotifierState
///
/// Shared handle to the notifier wired into the application state.
pub type NotifierState = Arc<dyn Notifier>;

/// dispatch
///
/// Sends `message` on a background task. Failures are logged and dropped.
pub fn dispatch(notifier: NotifierState, message: ConfirmationEmail) {
    tokio::spawn(async move {
        match notifier.send_confirmation(&message).await {
            Ok(()) => tracing::debug!(username = %message.username, "confirmation code sent"),
            Err(e) => tracing::warn!(
                username = %message.username,
                error = %e,
                "failed to send confirmation code"
            ),
        }
    });
}

// 2. The Real Implementation (SMTP relay)
/// SmtpNotifier
///
/// Sends mail through an authenticated SMTP relay (STARTTLS/TLS via lettre's relay builder).
pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    /// new
    ///
    /// Builds the transport from configuration. Fails on an unparsable sender
    /// address or relay host so misconfiguration surfaces at startup.
    pub fn new(config: &SmtpConfig) -> Result<Self, String> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|_| format!("Invalid from address: {}", config.from))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| format!("Failed to create mailer for {}: {e}", config.host))?;
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_confirmation(&self, message: &ConfirmationEmail) -> Result<(), String> {
        let to: Mailbox = format!("{} <{}>", message.username, message.email)
            .parse()
            .map_err(|_| format!("Invalid to address: {}", message.email))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .header(ContentType::TEXT_PLAIN)
            .subject(ConfirmationEmail::SUBJECT)
            .body(message.body())
            .map_err(|e| format!("Failed to build email: {e}"))?;

        self.mailer
            .send(email)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

// 3. Local development
/// LogNotifier
///
/// Writes the code to the log instead of mailing it. Selected when no SMTP host
/// is configured outside production.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_confirmation(&self, message: &ConfirmationEmail) -> Result<(), String> {
        tracing::info!(
            username = %message.username,
            email = %message.email,
            code = %message.code,
            "confirmation code (not mailed: SMTP is not configured)"
        );
        Ok(())
    }
}

// 4. The Mock Implementation (For Tests)
/// MockNotifier
///
/// Records every message instead of sending it, so tests can read back the
/// confirmation code that a real user would receive by email.
#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<ConfirmationEmail>>,
    /// When true, every delivery fails after being recorded.
    pub should_fail: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<ConfirmationEmail> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The most recent code mailed to `username`, if any.
    pub fn last_code_for(&self, username: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|message| message.username == username)
            .map(|message| message.code)
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send_confirmation(&self, message: &ConfirmationEmail) -> Result<(), String> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.clone());

        if self.should_fail {
            Err("Simulated delivery failure".to_string())
        } else {
            Ok(())
        }
    }
}
