pub mod bundle;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod dictionary;
pub mod facet;
pub mod grouping;
pub mod interval;
pub mod record;
pub mod render;
pub mod search;
pub mod subtasks;
pub mod tags;
pub mod text;
pub mod video;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info,
  warn
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
    "starting catalog CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.catalogrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );
  if let Some(dir) = &cli.data {
    cfg.set(
      "data.location",
      &dir.to_string_lossy()
    );
  }
  if let Some(page) = &cli.page {
    cfg.set("page", page);
  }

  let kind = cfg.page()?;
  let renderer =
    render::Renderer::new(&cfg)?;

  let data_dir = cfg.data_dir();
  let bundle =
    bundle::Bundle::open(&data_dir)
      .with_context(|| {
        format!(
          "failed to open data bundle \
           at {}",
          data_dir.display()
        )
      })?;

  let mut ctx =
    context::AppContext::new(
      cfg, bundle, kind
    )?;

  let inv =
    cli::Invocation::parse(cli.rest);
  ctx.apply_terms(&inv.filter_terms)?;

  if let Some(resolved) = ctx
    .apply_subtask_flags(
      cli.min_subtasks.as_deref(),
      cli.max_subtasks.as_deref()
    )?
  {
    if !resolved.is_valid() {
      let advisory =
        ctx.subtask_input().advisory();
      warn!(
        last_valid = %ctx.subtask_input().last_valid(),
        "{advisory}"
      );
      eprintln!("{advisory}");
    } else if resolved.corrected {
      debug!(
        range = ?resolved.range,
        "crossed subtask bounds corrected"
      );
    }
  }

  commands::dispatch(
    &ctx, &renderer, inv
  )?;

  info!("done");
  Ok(())
}
