use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::context::{AppContext, CatalogView};
use crate::facet::{Dimension, FacetSnapshot};
use crate::record::{TaskKind, TaskRecord};
use crate::text::{format_count, format_duration, plural_tasks};
use crate::video::{PreviewState, PreviewStatus};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        Ok(Self { color: cfg.color()? })
    }

    /// The grouped task table with a count footer.
    #[tracing::instrument(skip_all)]
    pub fn write_listing<W: Write>(&self, out: &mut W, ctx: &AppContext, view: &CatalogView<'_>) -> anyhow::Result<()> {
        let headers: &[&str] = match ctx.kind {
            TaskKind::Composite => &["Task", "Category", "Length", "Subtasks", "Skills"],
            TaskKind::Atomic => &["Task", "Length", "Skills", "Targets"],
        };

        for group in &view.groups {
            let count = view.group_counts.get(&group.key.id).copied().unwrap_or(0);
            writeln!(out, "{} {}", self.paint(&group.key.label, "1"), format_count(count))?;

            let rows = group.tasks.iter().map(|record| self.task_row(ctx, record)).collect();
            write_table(&mut *out, headers, rows)?;
            writeln!(out)?;
        }

        writeln!(out, "Showing {}", plural_tasks(view.total()))?;
        Ok(())
    }

    fn task_row(&self, ctx: &AppContext, record: &TaskRecord) -> Vec<String> {
        let name = self.paint(&record.name, "36");
        let length = format_duration(record.horizon_seconds);
        let skills = record
            .tag_keys
            .iter()
            .map(|tag| format!("+{tag}"))
            .collect::<Vec<_>>()
            .join(" ");

        match ctx.kind {
            TaskKind::Composite => {
                let category = record
                    .category
                    .as_deref()
                    .map(|key| ctx.category_label(key).to_string())
                    .unwrap_or_else(|| "—".to_string());
                let subtasks = record
                    .subtask_count
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "—".to_string());
                vec![name, category, length, subtasks, skills]
            }
            TaskKind::Atomic => {
                let targets = record.target_membership.iter().cloned().collect::<Vec<_>>().join(", ");
                vec![name, length, skills, targets]
            }
        }
    }

    #[tracing::instrument(skip_all, fields(task = %record.name))]
    pub fn write_info<W: Write>(&self, out: &mut W, ctx: &AppContext, record: &TaskRecord) -> anyhow::Result<()> {
        let dict = &ctx.dictionary;
        let group = ctx.grouper().group_of(record);

        writeln!(out, "name        {}", record.name)?;
        writeln!(out, "kind        {}", record.kind.as_str())?;
        writeln!(out, "group       {}", group.label)?;
        writeln!(
            out,
            "category    {}",
            record.category.as_deref().map(|k| dict.category_label(k)).unwrap_or("—")
        )?;
        writeln!(out, "length      {}", format_duration(record.horizon_seconds))?;
        writeln!(
            out,
            "subtasks    {}",
            record.subtask_count.map(|n| n.to_string()).unwrap_or_else(|| "—".to_string())
        )?;
        writeln!(
            out,
            "navigation  {}",
            match record.navigation {
                Some(true) => "yes",
                Some(false) => "no",
                None => "—",
            }
        )?;
        let skills: Vec<&str> = record.tag_keys.iter().map(|k| dict.skill_label(k)).collect();
        writeln!(out, "skills      {}", skills.join(", "))?;
        let targets: Vec<&str> = record.target_membership.iter().map(|k| dict.target_label(k)).collect();
        writeln!(out, "targets     {}", targets.join(", "))?;
        if let Some(url) = &record.source_url {
            writeln!(out, "source      {url}")?;
        }
        if !record.description.is_empty() {
            writeln!(out, "description {}", record.description)?;
        }
        Ok(())
    }

    /// Facet counts per bucket. Zero counts are kept so a reader can see
    /// which buckets the current filter empties.
    #[tracing::instrument(skip_all)]
    pub fn write_facets<W: Write>(
        &self,
        out: &mut W,
        ctx: &AppContext,
        facets: &FacetSnapshot,
        dimensions: &[Dimension],
    ) -> anyhow::Result<()> {
        for (pos, &dimension) in dimensions.iter().enumerate() {
            if pos > 0 {
                writeln!(out)?;
            }
            writeln!(out, "{}", self.paint(dimension.as_str(), "1"))?;

            let rows = facets
                .get(dimension)
                .iter()
                .map(|(key, count)| {
                    let label = bucket_label(ctx, dimension, key);
                    let count = if *count == 0 {
                        self.paint("0", "2")
                    } else {
                        count.to_string()
                    };
                    vec![key.clone(), label, count]
                })
                .collect();
            write_table(&mut *out, &["Key", "Label", "Count"], rows)?;
        }
        Ok(())
    }

    pub fn write_suggestions<W: Write>(&self, out: &mut W, records: &[&TaskRecord]) -> anyhow::Result<()> {
        if records.is_empty() {
            writeln!(out, "No matches")?;
            return Ok(());
        }
        for record in records {
            writeln!(out, "{}  {}", self.paint(&record.name, "36"), record.group)?;
        }
        Ok(())
    }

    pub fn write_sources<W: Write>(&self, out: &mut W, sources: &[String]) -> anyhow::Result<()> {
        for (idx, src) in sources.iter().enumerate() {
            writeln!(out, "{}  {src}", idx + 1)?;
        }
        Ok(())
    }

    pub fn write_preview<W: Write>(&self, out: &mut W, state: &PreviewState) -> anyhow::Result<()> {
        writeln!(out, "title       {}", state.title)?;
        if !state.description.is_empty() {
            writeln!(out, "caption     {}", state.description)?;
        }
        match &state.status {
            PreviewStatus::Ready => {
                let src = state.active_src.as_deref().unwrap_or_default();
                writeln!(out, "status      {}", self.paint("ready", "32"))?;
                writeln!(out, "playing     {src}")?;
            }
            PreviewStatus::Unavailable(reason) => {
                writeln!(out, "status      {}", self.paint("unavailable", "31"))?;
                writeln!(out, "{reason}")?;
            }
            PreviewStatus::Loading => {
                let src = state.active_src.as_deref().unwrap_or_default();
                writeln!(out, "status      {}", self.paint("still loading", "33"))?;
                writeln!(out, "waiting on  {src}")?;
            }
            PreviewStatus::Idle => writeln!(out, "status      idle")?,
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn bucket_label(ctx: &AppContext, dimension: Dimension, key: &str) -> String {
    let dict = &ctx.dictionary;
    match dimension {
        Dimension::Category => dict.category_label(key).to_string(),
        Dimension::Tag => dict.skill_label(key).to_string(),
        Dimension::Target => dict.target_label(key).to_string(),
        Dimension::Horizon => ctx
            .intervals
            .get(key)
            .map(|it| it.label.clone())
            .unwrap_or_else(|| key.to_string()),
    }
}

pub fn write_table<W: Write>(mut writer: W, headers: &[&str], rows: Vec<Vec<String>>) -> anyhow::Result<()> {
    let mut widths: Vec<usize> = headers.iter().map(|h| UnicodeWidthStr::width(*h)).collect();

    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "")?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

pub fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_pads_by_display_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            &["Task", "Length"],
            vec![
                vec!["\x1b[36mOpenDrawer\x1b[0m".to_string(), "—".to_string()],
                vec!["A".to_string(), "12s".to_string()],
            ],
        )
        .expect("table");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Task       Length ");
        assert_eq!(lines[1], "---------- ------ ");
        assert_eq!(strip_ansi(lines[2]), "OpenDrawer —      ");
        assert_eq!(lines[3], "A          12s    ");
    }

    #[test]
    fn invalid_color_setting_is_rejected() {
        let mut cfg = Config::default();
        cfg.set("color", "sometimes");
        assert!(Renderer::new(&cfg).is_err());
        cfg.set("color", "off");
        assert!(Renderer::new(&cfg).is_ok());
    }
}
