pub mod app;
pub mod bucket;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod edit;
pub mod position;
pub mod render;
pub mod store;
pub mod task;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting storytask CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let settings = cfg.app_settings()?;
  let store = store::RestStore::new(
    cfg.store_config()?
  )
  .context(
    "failed to set up task store client"
  )?;

  let renderer =
    render::Renderer::new(&cfg)?;
  let command = cli
    .command
    .unwrap_or(cli::Command::Board);
  let today =
    datetime::local_today(Utc::now());

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;

  let mut state =
    app::AppState::new(store, settings);
  runtime.block_on(commands::dispatch(
    &mut state,
    &renderer,
    command,
    today
  ))?;

  info!("done");
  Ok(())
}
