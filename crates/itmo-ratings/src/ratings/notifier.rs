use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::cache::RatingCache;
use super::formatter::render_summary;
use super::scraper::RatingSource;
use crate::error::AppError;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("recipient user id must be non-zero")]
    InvalidRecipient,
    #[error("message text must not be empty")]
    EmptyMessage,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status} from messaging API")]
    Status { status: u16 },
    #[error("message rejected: {description}")]
    Rejected { description: String },
}

/// Delivers a text message to one user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, user_id: i64, text: &str) -> Result<(), NotifyError>;
}

/// Checks run before any delivery attempt.
pub fn validate_message(user_id: i64, text: &str) -> Result<(), NotifyError> {
    if user_id == 0 {
        return Err(NotifyError::InvalidRecipient);
    }
    if text.trim().is_empty() {
        return Err(NotifyError::EmptyMessage);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct BotApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram Bot API sender.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: TELEGRAM_API_BASE.to_string(),
            token: token.into(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }
}

// The token is part of the request path, keep it out of debug output.
impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(&self, user_id: i64, text: &str) -> Result<(), NotifyError> {
        validate_message(user_id, text)?;

        let response = self
            .client
            .post(self.send_message_url())
            .json(&SendMessageRequest {
                chat_id: user_id,
                text,
                parse_mode: "Markdown",
            })
            .send()
            .await?;

        let status = response.status();
        let body: Option<BotApiResponse> = response.json().await.ok();

        match body {
            Some(reply) if reply.ok && status.is_success() => Ok(()),
            Some(BotApiResponse {
                description: Some(description),
                ..
            }) => Err(NotifyError::Rejected { description }),
            _ if !status.is_success() => Err(NotifyError::Status {
                status: status.as_u16(),
            }),
            _ => Err(NotifyError::Rejected {
                description: "messaging API reported failure".to_string(),
            }),
        }
    }
}

/// One-shot job: refresh, look the applicant up, render, and deliver the summary.
///
/// With `program_id` set only that program's row is sent. Returns the delivered text.
pub async fn notify_student<S, N>(
    cache: &RatingCache<S>,
    notifier: &N,
    cancel: &CancellationToken,
    student_id: &str,
    user_id: i64,
    program_id: Option<i64>,
) -> Result<String, AppError>
where
    S: RatingSource,
    N: Notifier + ?Sized,
{
    if student_id.trim().is_empty() {
        return Err(AppError::MissingSetting("STUDENT_ID"));
    }
    if user_id == 0 {
        return Err(NotifyError::InvalidRecipient.into());
    }

    cache.refresh(cancel).await?;

    let mut summary = cache.summary(cancel, student_id).await?;
    if let Some(program_id) = program_id {
        summary = summary.for_program(program_id);
    }

    let text = render_summary(&summary)?;
    notifier.send_message(user_id, &text).await?;
    info!(student_id, rows = summary.rows.len(), "rating summary delivered");

    Ok(text)
}
