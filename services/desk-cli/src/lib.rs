mod cli;
mod demo;
mod infra;
mod recap;

use review_desk::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
