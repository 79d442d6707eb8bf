pub mod blob;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod debounce;
pub mod error;
pub mod intent;
pub mod reminders;
pub mod remote;
pub mod render;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod task;
pub mod view;
pub mod watcher;

use std::ffi::OsString;
use std::sync::Arc;

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
    "starting protask"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.protaskrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  datetime::init_project_timezone(
    config::timezone_name(&cfg)
      .as_deref()
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let blob = blob::FileBlobStore::open(
    &data_dir
  )
  .with_context(|| {
    format!(
      "failed to open blob store at {}",
      data_dir.display()
    )
  })?;

  let now = Utc::now();
  let user = config::resolve_user(&cfg);
  let mut store = store::TaskStore::open(
    Arc::new(blob),
    user,
    datetime::local_today(now)
  );

  let renderer =
    render::Renderer::new(&cfg)?;

  commands::dispatch(
    &mut store,
    &cfg,
    &renderer,
    cli.command,
    now
  )?;

  info!("done");
  Ok(())
}
