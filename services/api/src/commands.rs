use crate::infra::{build_cache, cancel_on_ctrl_c};
use clap::Args;
use itmo_ratings::config::AppConfig;
use itmo_ratings::error::AppError;
use itmo_ratings::ratings::{notify_student, render_summary, TelegramNotifier};
use itmo_ratings::telemetry;

#[derive(Args, Debug, Default)]
pub(crate) struct SummaryArgs {
    /// Applicant identifier (falls back to STUDENT_ID)
    #[arg(long)]
    pub(crate) student_id: Option<String>,
    /// Show only this program (falls back to PROGRAM_ID)
    #[arg(long)]
    pub(crate) program_id: Option<i64>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct NotifyArgs {
    /// Applicant identifier (falls back to STUDENT_ID)
    #[arg(long)]
    pub(crate) student_id: Option<String>,
    /// Telegram chat receiving the summary (falls back to TELEGRAM_USER_ID)
    #[arg(long)]
    pub(crate) telegram_user_id: Option<i64>,
    /// Send only this program (falls back to PROGRAM_ID)
    #[arg(long)]
    pub(crate) program_id: Option<i64>,
}

pub(crate) async fn run_summary(args: SummaryArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let student_id = resolve_student(args.student_id, &config)?;
    let program_id = args.program_id.or(config.defaults.program_id);

    let cache = build_cache(&config)?;
    let cancel = cache.shutdown_token().clone();
    cancel_on_ctrl_c(cancel.clone());

    cache.refresh(&cancel).await?;
    let mut summary = cache.summary(&cancel, &student_id).await?;
    if let Some(program_id) = program_id {
        summary = summary.for_program(program_id);
    }

    println!("Rating summary for applicant {}", summary.student_id);
    print!("{}", render_summary(&summary)?);
    Ok(())
}

pub(crate) async fn run_notify(args: NotifyArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let student_id = resolve_student(args.student_id, &config)?;
    let user_id = args
        .telegram_user_id
        .or(config.telegram.user_id)
        .ok_or(AppError::MissingSetting("TELEGRAM_USER_ID"))?;
    let token = config
        .telegram
        .api_token
        .clone()
        .ok_or(AppError::MissingSetting("TELEGRAM_API_TOKEN"))?;
    let program_id = args.program_id.or(config.defaults.program_id);

    let cache = build_cache(&config)?;
    let cancel = cache.shutdown_token().clone();
    cancel_on_ctrl_c(cancel.clone());

    let notifier = TelegramNotifier::new(token);
    notify_student(cache.as_ref(), &notifier, &cancel, &student_id, user_id, program_id).await?;

    println!("Summary for applicant {student_id} sent to chat {user_id}");
    Ok(())
}

fn resolve_student(flag: Option<String>, config: &AppConfig) -> Result<String, AppError> {
    flag.or_else(|| config.defaults.student_id.clone())
        .filter(|id| !id.trim().is_empty())
        .ok_or(AppError::MissingSetting("STUDENT_ID"))
}
