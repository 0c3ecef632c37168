mod cli;

use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;

use trellis::config::Config;
use trellis::logging;
use trellis::sync::Session;
use trellis::trello::api_types::{ActionSnapshot, MemberSnapshot};
use trellis::trello::TrelloClient;

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = cli::Args::parse();

  // Hold the guard so buffered log lines are flushed on exit
  let _log_guard = logging::init(args.verbose)?;

  let config = Config::load(args.config.as_deref())?;
  let client = TrelloClient::from_config(&config)?;

  // Members and actions are reachable by reference, so their remotes live on
  // the session. Card-scoped endpoints are passed per entity.
  let session = Session::new(config.sync.settings());
  session.register_remote::<MemberSnapshot>(Arc::new(client.clone()));
  session.register_remote::<ActionSnapshot>(Arc::new(client.clone()));

  let result = cli::run(args.command, &client, &session).await;
  session.teardown();
  result
}
