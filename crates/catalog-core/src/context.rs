use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, bail};
use tracing::{debug, info, warn};

use crate::bundle::Bundle;
use crate::config::Config;
use crate::dictionary::Dictionary;
use crate::facet::{FacetSnapshot, FacetUniverse, FilterState, visible};
use crate::grouping::{ActivityGrouper, FixtureGrouper, Grouper, SkillGrouper, TaskGroup, group_counts, group_visible};
use crate::interval::IntervalSet;
use crate::record::{TaskIndex, TaskKind, TaskRecord};
use crate::search::suggest;
use crate::subtasks::{ResolvedSubtasks, SubtaskInput};

/// How atomic tasks are bucketed in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicGrouping {
    Skill,
    Fixture,
}

impl AtomicGrouping {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skill" | "skills" => Some(Self::Skill),
            "fixture" | "fixtures" => Some(Self::Fixture),
            _ => None,
        }
    }
}

/// Everything one catalog page needs, built once per invocation.
pub struct AppContext {
    pub config: Config,
    pub kind: TaskKind,
    pub dictionary: Dictionary,
    pub index: TaskIndex,
    pub intervals: IntervalSet,
    pub universe: FacetUniverse,
    pub filter: FilterState,
    grouper: Box<dyn Grouper>,
    subtasks: SubtaskInput,
}

/// The result of one recomputation: what is visible, how it is grouped, and
/// the live facet counts.
#[derive(Debug)]
pub struct CatalogView<'a> {
    pub visible: Vec<&'a TaskRecord>,
    pub groups: Vec<TaskGroup<'a>>,
    pub group_counts: BTreeMap<String, usize>,
    pub facets: FacetSnapshot,
}

impl CatalogView<'_> {
    pub fn total(&self) -> usize {
        self.visible.len()
    }
}

impl AppContext {
    #[tracing::instrument(skip(config, bundle), fields(kind = kind.as_str()))]
    pub fn new(config: Config, bundle: Bundle, kind: TaskKind) -> anyhow::Result<Self> {
        let index = TaskIndex::build(&bundle, kind);
        let dictionary = bundle.dictionary;

        let intervals = IntervalSet::stepped(dictionary.horizon_spec(kind))
            .context("invalid horizon buckets in dictionary")?;
        let universe = facet_universe(&dictionary, &index, &intervals, kind);

        let grouper: Box<dyn Grouper> = match kind {
            TaskKind::Composite => Box::new(ActivityGrouper),
            TaskKind::Atomic => {
                let raw = config.get("atomic.grouping").unwrap_or_default();
                match AtomicGrouping::parse(&raw) {
                    Some(AtomicGrouping::Fixture) => Box::new(FixtureGrouper),
                    Some(AtomicGrouping::Skill) if !dictionary.skill_groups.is_empty() => {
                        Box::new(SkillGrouper::new(&dictionary))
                    }
                    Some(AtomicGrouping::Skill) => {
                        warn!("no skill groups in dictionary; grouping by fixture");
                        Box::new(FixtureGrouper)
                    }
                    None => {
                        return Err(anyhow::anyhow!(
                            "invalid atomic.grouping '{raw}'; expected skill or fixture"
                        ));
                    }
                }
            }
        };

        let subtasks = SubtaskInput::new(config.subtask_domain());

        info!(
            tasks = index.len(),
            buckets = intervals.len(),
            tags = universe.tags.len(),
            "catalog context ready"
        );

        Ok(Self {
            config,
            kind,
            dictionary,
            index,
            intervals,
            universe,
            filter: FilterState::default(),
            grouper,
            subtasks,
        })
    }

    pub fn grouper(&self) -> &dyn Grouper {
        self.grouper.as_ref()
    }

    pub fn subtask_input(&self) -> &SubtaskInput {
        &self.subtasks
    }

    /// Replaces the filter with one parsed from command-line terms.
    pub fn apply_terms(&mut self, terms: &[String]) -> anyhow::Result<()> {
        self.filter = FilterState::parse(terms, &self.intervals)?;
        debug!(filter = ?self.filter, "applied filter terms");
        Ok(())
    }

    /// Command-line subtask bounds. They cannot be combined with a
    /// `subtasks:` filter term, which would otherwise be overwritten.
    pub fn apply_subtask_flags(
        &mut self,
        min_raw: Option<&str>,
        max_raw: Option<&str>,
    ) -> anyhow::Result<Option<ResolvedSubtasks>> {
        if min_raw.is_none() && max_raw.is_none() {
            return Ok(None);
        }
        if let Some(range) = self.filter.subtasks {
            bail!(
                "--min-subtasks/--max-subtasks conflict with the subtasks:{}-{} filter term",
                range.min,
                range.max
            );
        }
        Ok(Some(self.set_subtask_bounds(
            min_raw.unwrap_or_default(),
            max_raw.unwrap_or_default(),
        )))
    }

    /// Feeds raw subtask bound text through validation. Invalid text keeps
    /// the last valid range in force.
    pub fn set_subtask_bounds(&mut self, min_raw: &str, max_raw: &str) -> ResolvedSubtasks {
        let resolved = self.subtasks.resolve(min_raw, max_raw);
        self.filter.subtasks = resolved.range;
        resolved
    }

    /// Visible set, group counts and facet counts for the current filter.
    #[tracing::instrument(skip(self))]
    pub fn refresh(&self) -> CatalogView<'_> {
        let visible = visible(&self.index, &self.filter);
        let groups = group_visible(&visible, self.grouper());
        let counts = group_counts(&visible, self.grouper());
        let facets = FacetSnapshot::compute(&self.index, &self.filter, &self.universe);
        debug!(visible = visible.len(), groups = groups.len(), "refreshed catalog view");
        CatalogView {
            visible,
            groups,
            group_counts: counts,
            facets,
        }
    }

    pub fn suggest(&self, query: &str) -> Vec<&TaskRecord> {
        suggest(&self.index, &self.filter, query, self.config.suggest_limit())
    }

    pub fn category_label<'a>(&'a self, key: &'a str) -> &'a str {
        self.dictionary.category_label(key)
    }
}

/// Candidate buckets: declared keys first, then anything the records use
/// that the dictionary does not declare. Tags end up ordered by frequency.
fn facet_universe(dict: &Dictionary, index: &TaskIndex, intervals: &IntervalSet, kind: TaskKind) -> FacetUniverse {
    let mut categories: Vec<String> = dict.categories.iter().map(|c| c.key.clone()).collect();
    extend_unseen(&mut categories, index.iter().filter_map(|r| r.category.clone()));

    let mut tags: Vec<String> = dict.tag_order.clone();
    extend_unseen(&mut tags, dict.skills.iter().map(|s| s.key.clone()));
    tags.retain(|t| index.iter().any(|r| r.tag_keys.contains(t)));
    extend_unseen(&mut tags, index.iter().flat_map(|r| r.tag_keys.iter().cloned()));

    let targets = dict.targets_for(kind).map(|t| t.key.clone()).collect();

    let mut universe = FacetUniverse {
        categories,
        tags,
        horizons: intervals.clone(),
        targets,
    };
    universe.order_tags_by_frequency(index);
    universe
}

fn extend_unseen(into: &mut Vec<String>, items: impl Iterator<Item = String>) {
    let mut seen: BTreeSet<String> = into.iter().cloned().collect();
    for item in items {
        if seen.insert(item.clone()) {
            into.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Label;

    fn context(kind: TaskKind) -> AppContext {
        let mut bundle = Bundle::default();
        bundle.dictionary.categories = vec![Label {
            key: "declared".to_string(),
            label: "Declared".to_string(),
        }];
        AppContext::new(Config::default(), bundle, kind).expect("context")
    }

    #[test]
    fn empty_bundle_gives_empty_view() {
        let ctx = context(TaskKind::Composite);
        let view = ctx.refresh();
        assert_eq!(view.total(), 0);
        assert!(view.groups.is_empty());
        assert_eq!(view.facets.categories, vec![("declared".to_string(), 0)]);
    }

    #[test]
    fn atomic_without_skill_groups_falls_back_to_fixtures() {
        let ctx = context(TaskKind::Atomic);
        let record = TaskRecord::new("X", TaskKind::Atomic, "");
        assert_eq!(ctx.grouper().group_of(&record).label, "Miscellaneous");
    }

    #[test]
    fn invalid_subtask_text_keeps_last_valid_range() {
        let mut ctx = context(TaskKind::Composite);
        let resolved = ctx.set_subtask_bounds("3", "5");
        assert!(resolved.is_valid());
        assert_eq!(ctx.filter.subtasks.map(|r| (r.min, r.max)), Some((3, 5)));

        let resolved = ctx.set_subtask_bounds("x", "5");
        assert!(resolved.min_invalid);
        assert_eq!(ctx.filter.subtasks.map(|r| (r.min, r.max)), Some((3, 5)));

        ctx.set_subtask_bounds("", "");
        assert_eq!(ctx.filter.subtasks, None);
    }

    #[test]
    fn subtask_flags_conflict_with_filter_term() {
        let mut ctx = context(TaskKind::Composite);
        assert_eq!(ctx.apply_subtask_flags(None, None).expect("no flags"), None);

        let resolved = ctx
            .apply_subtask_flags(Some("4"), None)
            .expect("flags alone")
            .expect("resolved");
        assert!(resolved.is_valid());
        assert_eq!(ctx.filter.subtasks.map(|r| (r.min, r.max)), Some((4, 16)));

        ctx.apply_terms(&["subtasks:3-5".to_string()]).expect("terms");
        assert!(ctx.apply_subtask_flags(Some("4"), Some("6")).is_err());
        assert_eq!(ctx.filter.subtasks.map(|r| (r.min, r.max)), Some((3, 5)));
    }

    #[test]
    fn unseen_keys_append_in_order() {
        let mut keys = vec!["b".to_string()];
        extend_unseen(&mut keys, ["a", "b", "c", "a"].into_iter().map(str::to_string));
        assert_eq!(keys, vec!["b", "a", "c"]);
    }
}
