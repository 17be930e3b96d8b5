use clap::Parser;

mod cli;
mod config;
mod content;
mod download;
mod error;
mod extractor;
mod fetcher;
mod proxy;
mod server;
mod share;
#[cfg(test)]
mod test_util;
mod util;

pub use error::{Error, Result};
pub use util::{ByteStream, W};

use cli::Cli;
use config::Config;
use error::{EXIT_FAILURE, EXIT_INTERRUPTED};

#[tokio::main(flavor = "current_thread")]
async fn main() {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_max_level(cli.log_level())
    .with_writer(std::io::stderr)
    .init();

  let config = Config::from_env();
  let command = cli.command;

  // the server shuts down gracefully on its own
  let res = if command.is_long_running() {
    Some(command.run(config).await)
  } else {
    tokio::select! {
      res = command.run(config) => Some(res),
      _ = tokio::signal::ctrl_c() => None,
    }
  };

  match res {
    Some(Ok(())) => {}
    Some(Err(e)) => {
      eprintln!("error: {e}");
      std::process::exit(EXIT_FAILURE);
    }
    None => {
      eprintln!("\ncancelled");
      std::process::exit(EXIT_INTERRUPTED);
    }
  }
}
