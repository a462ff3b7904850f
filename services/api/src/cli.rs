use crate::commands::{run_notify, run_summary, NotifyArgs, SummaryArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use itmo_ratings::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "ITMO Ratings",
    about = "Track master's admission standings across every ITMO program",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Scrape every program once and print an applicant's summary
    Summary(SummaryArgs),
    /// Scrape every program once and send an applicant's summary through Telegram
    Notify(NotifyArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Summary(args) => run_summary(args).await,
        Command::Notify(args) => run_notify(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["itmo-ratings-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn notify_accepts_overrides() {
        let cli = Cli::try_parse_from([
            "itmo-ratings-api",
            "notify",
            "--student-id",
            "4410001",
            "--telegram-user-id",
            "987654",
            "--program-id",
            "1651",
        ])
        .expect("parses");

        match cli.command {
            Some(Command::Notify(args)) => {
                assert_eq!(args.student_id.as_deref(), Some("4410001"));
                assert_eq!(args.telegram_user_id, Some(987654));
                assert_eq!(args.program_id, Some(1651));
            }
            other => panic!("expected notify command, got {other:?}"),
        }
    }

    #[test]
    fn serve_rejects_invalid_port() {
        assert!(Cli::try_parse_from(["itmo-ratings-api", "serve", "--port", "http"]).is_err());
    }
}
