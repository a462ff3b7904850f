mod cli;
mod commands;
mod infra;
mod middleware;
mod routes;
mod server;

use itmo_ratings::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
