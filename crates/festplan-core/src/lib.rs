pub mod cli;
pub mod commands;
pub mod config;
pub mod conflict;
pub mod contact;
pub mod datastore;
pub mod datetime;
pub mod error;
pub mod festival;
pub mod lunar;
pub mod planner;
pub mod render;
pub mod repo;
pub mod schedule;
pub mod settings;
pub mod timeline;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use conflict::check_conflict;
pub use error::{
  InvalidDateError,
  ValidationError
};
pub use festival::{
  FestivalName,
  MinorNewYearMode,
  is_festival
};
pub use lunar::{
  LunarDate,
  Month,
  format_lunar,
  format_lunar_full,
  lunar_to_solar,
  solar_to_lunar
};
pub use timeline::{
  HolidayWindow,
  NotableDay,
  build_notable_days
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
    "starting festplan"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.festplanrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
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

  let store =
    datastore::DataStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?;

  let settings = store.load_settings();
  let mut planner =
    planner::Planner::new(
      store, settings
    );
  if let Some(mode) =
    cfg.minor_new_year_mode()?
  {
    debug!(%mode, "minor new year mode forced by config");
    planner.set_mode(mode);
  }

  let mut renderer =
    render::Renderer::new(&cfg)?;
  let inv = cli::Invocation::parse(
    &cfg, cli.rest
  )?;

  commands::dispatch(
    &mut planner,
    &cfg,
    &mut renderer,
    inv
  )?;

  info!("done");
  Ok(())
}
