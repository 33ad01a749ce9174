use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use tracing::{debug, info, instrument, warn};

use crate::cli::Invocation;
use crate::context::AppContext;
use crate::facet::{Dimension, tag_frequency};
use crate::record::TaskRecord;
use crate::render::Renderer;
use crate::video::{HttpProbe, LoaderSettings, PreviewState, VideoHosting, VideoPreview};

pub const DEFAULT_COMMAND: &str = "list";

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "list",
        "info",
        "facets",
        "suggest",
        "video",
        "tags",
        "_commands",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Runs one command against a context whose filter is already applied.
#[instrument(skip(ctx, renderer, inv), fields(command = %inv.command))]
pub fn dispatch(ctx: &AppContext, renderer: &Renderer, inv: Invocation) -> anyhow::Result<()> {
    debug!(
        filter = ?inv.filter_terms,
        args = ?inv.command_args,
        "dispatching command"
    );

    let mut out = io::stdout().lock();
    match inv.command.as_str() {
        "list" => cmd_list(ctx, renderer, &mut out),
        "info" => cmd_info(ctx, renderer, &mut out, &inv.command_args),
        "facets" => cmd_facets(ctx, renderer, &mut out, &inv.command_args),
        "suggest" => cmd_suggest(ctx, renderer, &mut out, &inv.command_args),
        "video" => cmd_video(ctx, renderer, &mut out, &inv.command_args),
        "tags" => cmd_tags(ctx, &mut out),
        "_commands" => cmd_commands(&mut out),
        "_show" => cmd_show(ctx, &mut out),
        "help" => cmd_help(&mut out),
        "version" => {
            writeln!(out, "{}", env!("CARGO_PKG_VERSION"))?;
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn cmd_list<W: Write>(ctx: &AppContext, renderer: &Renderer, out: &mut W) -> anyhow::Result<()> {
    let view = ctx.refresh();
    info!(visible = view.total(), groups = view.groups.len(), "listing");
    renderer.write_listing(out, ctx, &view)
}

fn cmd_info<W: Write>(ctx: &AppContext, renderer: &Renderer, out: &mut W, args: &[String]) -> anyhow::Result<()> {
    let record = find_record(ctx, args)?;
    renderer.write_info(out, ctx, record)
}

fn cmd_facets<W: Write>(ctx: &AppContext, renderer: &Renderer, out: &mut W, args: &[String]) -> anyhow::Result<()> {
    let dimensions = if args.is_empty() {
        Dimension::ALL.to_vec()
    } else {
        args.iter()
            .map(|arg| Dimension::parse(arg).ok_or_else(|| anyhow!("unknown facet dimension: {arg}")))
            .collect::<anyhow::Result<Vec<_>>>()?
    };

    let view = ctx.refresh();
    renderer.write_facets(out, ctx, &view.facets, &dimensions)?;
    writeln!(out)?;
    writeln!(out, "Showing {} of {}", view.total(), ctx.index.len())?;
    Ok(())
}

fn cmd_suggest<W: Write>(ctx: &AppContext, renderer: &Renderer, out: &mut W, args: &[String]) -> anyhow::Result<()> {
    let query = args.join(" ");
    if query.trim().is_empty() {
        bail!("suggest needs a query");
    }
    let matches = ctx.suggest(&query);
    renderer.write_suggestions(out, &matches)
}

fn cmd_tags<W: Write>(ctx: &AppContext, out: &mut W) -> anyhow::Result<()> {
    let freq = tag_frequency(&ctx.index);
    for tag in &ctx.universe.tags {
        let count = freq.get(tag).copied().unwrap_or(0);
        writeln!(out, "{tag}\t{}\t{count}", ctx.dictionary.skill_label(tag))?;
    }
    Ok(())
}

fn cmd_commands<W: Write>(out: &mut W) -> anyhow::Result<()> {
    for command in known_command_names() {
        writeln!(out, "{command}")?;
    }
    Ok(())
}

fn cmd_show<W: Write>(ctx: &AppContext, out: &mut W) -> anyhow::Result<()> {
    for (k, v) in ctx.config.iter() {
        writeln!(out, "{k}={v}")?;
    }
    for file in &ctx.config.loaded_files {
        writeln!(out, "# loaded {}", file.display())?;
    }
    Ok(())
}

fn cmd_help<W: Write>(out: &mut W) -> anyhow::Result<()> {
    writeln!(
        out,
        "usage: catalog [options] [filter terms...] <command> [args]\n\
         \n\
         commands: list (default), info <task>, facets [dimension...], suggest <query>,\n\
         \x20         video <task> [--probe], tags, _show, _commands, help, version\n\
         \n\
         filter terms: words to search for, +<tag>, category:<key>, tag:<key>,\n\
         \x20             horizon:<bucket>, target:<key>, subtasks:<min>-<max>,\n\
         \x20             <slot>:none to select nothing"
    )?;
    Ok(())
}

/// Exact name first, then a case-insensitive match, then the single best
/// suggestion.
fn find_record<'a>(ctx: &'a AppContext, args: &[String]) -> anyhow::Result<&'a TaskRecord> {
    let name = args.join(" ");
    let name = name.trim();
    if name.is_empty() {
        bail!("a task name is required");
    }

    if let Some(record) = ctx.index.get(name) {
        return Ok(record);
    }
    if let Some(record) = ctx.index.iter().find(|r| r.name.eq_ignore_ascii_case(name)) {
        return Ok(record);
    }

    let candidates = ctx.suggest(name);
    match candidates.as_slice() {
        [only] => {
            debug!(query = %name, task = %only.name, "resolved task by suggestion");
            Ok(*only)
        }
        [] => Err(anyhow!("no task named '{name}'")),
        many => {
            let names: Vec<&str> = many.iter().take(5).map(|r| r.name.as_str()).collect();
            Err(anyhow!("no task named '{name}'; did you mean: {}", names.join(", ")))
        }
    }
}

fn cmd_video<W: Write>(ctx: &AppContext, renderer: &Renderer, out: &mut W, args: &[String]) -> anyhow::Result<()> {
    let probe = args.iter().any(|a| a == "--probe");
    let names: Vec<String> = args.iter().filter(|a| *a != "--probe").cloned().collect();
    let record = find_record(ctx, &names)?;

    let hosting = ctx.config.hosting();
    let sources = hosting.sources_for(&record.name, record.kind);
    if sources.is_empty() {
        bail!("task '{}' has no usable video name", record.name);
    }
    renderer.write_sources(out, &sources)?;
    if !probe {
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime for video probing")?;
    let state = runtime.block_on(probe_preview(
        &hosting,
        &sources,
        record,
        ctx.config.video_timeout(),
    ))?;

    writeln!(out)?;
    renderer.write_preview(out, &state)
}

/// Runs the fallback loader against the real hosts. The wait is bounded
/// because a slow non-final source only moves on after an explicit error.
#[instrument(skip(hosting, sources, record), fields(task = %record.name))]
async fn probe_preview(
    hosting: &VideoHosting,
    sources: &[String],
    record: &TaskRecord,
    timeout: Duration,
) -> anyhow::Result<PreviewState> {
    let backend = HttpProbe::new(timeout * 2)?;
    let settings = LoaderSettings {
        timeout,
        unavailable: hosting.unavailable_reason(),
    };
    let mut preview = VideoPreview::new(backend, settings);
    preview.open(sources, &record.name, &record.description);

    let budget = timeout * (sources.len() as u32 + 2);
    let state = match tokio::time::timeout(budget, preview.settled()).await {
        Ok(state) => state,
        Err(_) => {
            warn!(budget_secs = budget.as_secs(), "preview did not settle in time");
            preview.state()
        }
    };
    preview.close();
    Ok(state)
}
