use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

pub mod config;
pub mod parameters;
pub mod stack;
pub mod update;

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),

    #[error(transparent)]
    Stack(#[from] stack::Error),

    #[error(transparent)]
    Update(#[from] update::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    return match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{}", error);
            ExitCode::FAILURE
        }
    };
}

async fn run() -> Result<(), Error> {
    let config = config::from_env()?;
    let api = stack::CloudFormation::new(config.region.as_deref()).await?;

    update::Updater::new(&api, &config).run().await?;

    return Ok(());
}
