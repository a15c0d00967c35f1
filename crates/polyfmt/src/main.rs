#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]

#[macro_use]
mod environment;

mod arg_parser;
mod commands;
mod configuration;
mod dispatch;
mod errors;
mod format;
mod plugins;
mod run_cli;
mod utils;

use anyhow::Result;

use environment::RealEnvironment;
use environment::RealEnvironmentOptions;
use run_cli::AppError;

fn main() {
  let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
  rt.block_on(async move {
    match run().await {
      Ok(()) => {}
      Err(err) => {
        let message = format!("{:#}", err.inner);
        #[allow(clippy::print_stderr)]
        if !message.is_empty() {
          eprintln!("{}", message);
        }
        std::process::exit(err.exit_code);
      }
    }
  });
}

async fn run() -> Result<(), AppError> {
  let args = arg_parser::parse_args(std::env::args().collect()).map_err(|err| AppError::from(anyhow::Error::new(err)))?;
  let environment = RealEnvironment::new(RealEnvironmentOptions { log_level: args.log_level })?;
  run_cli::run_cli(&args, &environment).await.map_err(AppError::from)
}
