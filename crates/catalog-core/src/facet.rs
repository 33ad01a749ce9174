use std::collections::{
  BTreeMap,
  BTreeSet
};

use anyhow::anyhow;
use tracing::trace;

use crate::interval::{
  Interval,
  IntervalSet
};
use crate::record::{
  TaskIndex,
  TaskRecord
};
use crate::search::unique_tokens;
use crate::subtasks::SubtaskRange;

/// One filter slot: unconstrained, or an
/// explicit set. `Only` with an empty set
/// matches nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection<T: Ord> {
  All,
  Only(BTreeSet<T>)
}

impl<T: Ord> Default for Selection<T> {
  fn default() -> Self {
    Self::All
  }
}

impl<T: Ord> Selection<T> {
  pub fn none() -> Self {
    Self::Only(BTreeSet::new())
  }

  pub fn only<I>(items: I) -> Self
  where
    I: IntoIterator<Item = T>
  {
    Self::Only(
      items.into_iter().collect()
    )
  }

  pub fn is_all(&self) -> bool {
    matches!(self, Self::All)
  }

  pub fn admits(
    &self,
    value: &T
  ) -> bool {
    match self {
      | Self::All => true,
      | Self::Only(set) => {
        set.contains(value)
      }
    }
  }

  /// True when any of `values` is
  /// selected; an unconstrained slot
  /// admits everything, even no values.
  pub fn admits_any<'a, I>(
    &self,
    values: I
  ) -> bool
  where
    I: IntoIterator<Item = &'a T>,
    T: 'a
  {
    match self {
      | Self::All => true,
      | Self::Only(set) => {
        values
          .into_iter()
          .any(|v| set.contains(v))
      }
    }
  }

  /// Adds `value`; the first addition
  /// turns an unconstrained slot into a
  /// one-element set.
  pub fn add(&mut self, value: T) {
    match self {
      | Self::All => {
        *self = Self::Only(
          BTreeSet::from([value])
        );
      }
      | Self::Only(set) => {
        set.insert(value);
      }
    }
  }

  pub fn len(&self) -> Option<usize> {
    match self {
      | Self::All => None,
      | Self::Only(set) => {
        Some(set.len())
      }
    }
  }
}

/// The active predicates of one catalog
/// view. All slots start unconstrained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterState {
  pub search_tokens: BTreeSet<String>,
  pub categories:    Selection<String>,
  pub tags:          Selection<String>,
  pub horizons:      Selection<Interval>,
  pub targets:       Selection<String>,
  pub subtasks:      Option<SubtaskRange>
}

impl FilterState {
  /// Filter terms as typed on the
  /// command line. Repeated terms for
  /// one slot union; `<slot>:none`
  /// selects nothing.
  #[tracing::instrument(skip(
    terms, intervals
  ))]
  pub fn parse(
    terms: &[String],
    intervals: &IntervalSet
  ) -> anyhow::Result<Self> {
    let mut state = Self::default();
    for term in terms {
      parse_term(
        &mut state, term, intervals
      )?;
    }
    Ok(state)
  }

  pub fn set_search(
    &mut self,
    query: &str
  ) {
    self.search_tokens =
      unique_tokens(query)
        .into_iter()
        .collect();
  }

  pub fn is_unconstrained(
    &self
  ) -> bool {
    self.search_tokens.is_empty()
      && self.categories.is_all()
      && self.tags.is_all()
      && self.horizons.is_all()
      && self.targets.is_all()
      && self.subtasks.is_none()
  }

  pub fn passes(
    &self,
    record: &TaskRecord
  ) -> bool {
    passes(record, self)
  }

  /// This state with one dimension's
  /// slot narrowed to a single bucket.
  fn with_bucket(
    &self,
    bucket: &Bucket<'_>
  ) -> Self {
    let mut out = self.clone();
    match bucket {
      | Bucket::Category(key) => {
        out.categories = Selection::only(
          [key.to_string()]
        );
      }
      | Bucket::Tag(key) => {
        out.tags = Selection::only([
          key.to_string()
        ]);
      }
      | Bucket::Horizon(interval) => {
        out.horizons = Selection::only(
          [(*interval).clone()]
        );
      }
      | Bucket::Target(key) => {
        out.targets = Selection::only([
          key.to_string()
        ]);
      }
    }
    out
  }
}

fn parse_term(
  state: &mut FilterState,
  term: &str,
  intervals: &IntervalSet
) -> anyhow::Result<()> {
  if let Some(tag) =
    term.strip_prefix('+')
    && !tag.is_empty()
  {
    state.tags.add(tag.to_string());
    return Ok(());
  }

  let Some((slot, value)) =
    term.split_once(':')
  else {
    for token in unique_tokens(term) {
      state.search_tokens.insert(token);
    }
    return Ok(());
  };

  match slot.to_ascii_lowercase().as_str()
  {
    | "category" | "cat" => {
      apply_keys(
        &mut state.categories,
        value
      );
    }
    | "tag" | "skill" => {
      apply_keys(&mut state.tags, value);
    }
    | "target" => {
      apply_keys(
        &mut state.targets,
        value
      );
    }
    | "horizon" | "length" => {
      apply_horizons(
        &mut state.horizons,
        value,
        intervals
      )?;
    }
    | "subtasks" => {
      state.subtasks =
        Some(parse_subtask_range(value)?);
    }
    | _ => {
      for token in unique_tokens(term) {
        state
          .search_tokens
          .insert(token);
      }
    }
  }

  Ok(())
}

fn apply_keys(
  slot: &mut Selection<String>,
  value: &str
) {
  match value.trim() {
    | "none" => *slot = Selection::none(),
    | "all" => *slot = Selection::All,
    | list => {
      for key in list
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
      {
        slot.add(key.to_string());
      }
    }
  }
}

fn apply_horizons(
  slot: &mut Selection<Interval>,
  value: &str,
  intervals: &IntervalSet
) -> anyhow::Result<()> {
  match value.trim() {
    | "none" => *slot = Selection::none(),
    | "all" => *slot = Selection::All,
    | list => {
      for key in list
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
      {
        let interval = intervals
          .get(key)
          .ok_or_else(|| {
            anyhow!(
              "unknown horizon bucket: \
               {key}"
            )
          })?;
        slot.add(interval.clone());
      }
    }
  }
  Ok(())
}

fn parse_subtask_range(
  value: &str
) -> anyhow::Result<SubtaskRange> {
  let parse = |s: &str| {
    s.trim().parse::<u32>().map_err(
      |_| {
        anyhow!(
          "invalid subtask bound: {s}"
        )
      }
    )
  };

  let range = match value.split_once('-')
  {
    | Some((min, max)) => {
      SubtaskRange::new(
        parse(min)?,
        parse(max)?
      )
    }
    | None => {
      let n = parse(value)?;
      SubtaskRange::new(n, n)
    }
  };

  if range.min > range.max {
    return Err(anyhow!(
      "subtask range is crossed: {range}"
    ));
  }
  Ok(range)
}

/// AND of every constrained slot.
pub fn passes(
  record: &TaskRecord,
  state: &FilterState
) -> bool {
  let text_ok = state
    .search_tokens
    .iter()
    .all(|tok| {
      record
        .search_text
        .contains(&tok.to_lowercase())
    });

  let category_ok = match &state
    .categories
  {
    | Selection::All => true,
    | Selection::Only(set) => {
      record
        .category
        .as_ref()
        .is_some_and(|c| set.contains(c))
    }
  };

  let tags_ok = state
    .tags
    .admits_any(&record.tag_keys);

  let horizon_ok = match &state.horizons
  {
    | Selection::All => true,
    | Selection::Only(set) => {
      record.horizon_seconds.is_some_and(
        |secs| {
          set
            .iter()
            .any(|it| it.contains(secs))
        }
      )
    }
  };

  let target_ok = state
    .targets
    .admits_any(&record.target_membership);

  let subtasks_ok = match state.subtasks
  {
    | None => true,
    | Some(range) => {
      record
        .subtask_count
        .is_some_and(|n| range.contains(n))
    }
  };

  let ok = text_ok
    && category_ok
    && tags_ok
    && horizon_ok
    && target_ok
    && subtasks_ok;

  trace!(
    task = %record.name,
    text_ok,
    category_ok,
    tags_ok,
    horizon_ok,
    target_ok,
    subtasks_ok,
    "facet predicate evaluation"
  );
  ok
}

/// Records passing `state`, in index
/// order.
pub fn visible<'a>(
  index: &'a TaskIndex,
  state: &FilterState
) -> Vec<&'a TaskRecord> {
  index
    .iter()
    .filter(|r| passes(r, state))
    .collect()
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash
)]
pub enum Dimension {
  Category,
  Tag,
  Horizon,
  Target
}

impl Dimension {
  pub const ALL: [Dimension; 4] = [
    Dimension::Category,
    Dimension::Tag,
    Dimension::Horizon,
    Dimension::Target
  ];

  pub fn parse(s: &str) -> Option<Self> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "category" | "categories" => {
        Some(Self::Category)
      }
      | "tag" | "tags" | "skills" => {
        Some(Self::Tag)
      }
      | "horizon" | "horizons" => {
        Some(Self::Horizon)
      }
      | "target" | "targets" => {
        Some(Self::Target)
      }
      | _ => None
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      | Self::Category => "category",
      | Self::Tag => "tag",
      | Self::Horizon => "horizon",
      | Self::Target => "target"
    }
  }
}

enum Bucket<'a> {
  Category(&'a str),
  Tag(&'a str),
  Horizon(&'a Interval),
  Target(&'a str)
}

/// Candidate buckets for each dimension.
#[derive(Debug, Clone)]
pub struct FacetUniverse {
  pub categories: Vec<String>,
  pub tags:       Vec<String>,
  pub horizons:   IntervalSet,
  pub targets:    Vec<String>
}

impl FacetUniverse {
  fn buckets(
    &self,
    dimension: Dimension
  ) -> Vec<(&str, Bucket<'_>)> {
    match dimension {
      | Dimension::Category => {
        self
          .categories
          .iter()
          .map(|k| {
            (
              k.as_str(),
              Bucket::Category(k)
            )
          })
          .collect()
      }
      | Dimension::Tag => {
        self
          .tags
          .iter()
          .map(|k| {
            (k.as_str(), Bucket::Tag(k))
          })
          .collect()
      }
      | Dimension::Horizon => {
        self
          .horizons
          .iter()
          .map(|it| {
            (
              it.key.as_str(),
              Bucket::Horizon(it)
            )
          })
          .collect()
      }
      | Dimension::Target => {
        self
          .targets
          .iter()
          .map(|k| {
            (k.as_str(), Bucket::Target(k))
          })
          .collect()
      }
    }
  }

  /// Reorders tag buckets by how many
  /// records carry them, most first;
  /// ties keep their current order.
  pub fn order_tags_by_frequency(
    &mut self,
    index: &TaskIndex
  ) {
    let freq = tag_frequency(index);
    self.tags.sort_by_key(|tag| {
      std::cmp::Reverse(
        freq.get(tag).copied().unwrap_or(0)
      )
    });
  }
}

/// How many records carry each tag key.
pub fn tag_frequency(
  index: &TaskIndex
) -> BTreeMap<String, usize> {
  let mut out = BTreeMap::new();
  for record in index.iter() {
    for tag in &record.tag_keys {
      *out.entry(tag.clone()).or_insert(0) +=
        1;
    }
  }
  out
}

/// For each bucket of `dimension`, the
/// number of records that pass `state`
/// with only that slot replaced by the
/// bucket. Zero counts are kept.
#[tracing::instrument(skip(
  index, state, universe
))]
pub fn facet_counts(
  index: &TaskIndex,
  state: &FilterState,
  universe: &FacetUniverse,
  dimension: Dimension
) -> Vec<(String, usize)> {
  universe
    .buckets(dimension)
    .into_iter()
    .map(|(key, bucket)| {
      let narrowed =
        state.with_bucket(&bucket);
      let count = index
        .iter()
        .filter(|r| passes(r, &narrowed))
        .count();
      (key.to_string(), count)
    })
    .collect()
}

/// Facet counts for every dimension,
/// taken from one state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacetSnapshot {
  pub categories: Vec<(String, usize)>,
  pub tags:       Vec<(String, usize)>,
  pub horizons:   Vec<(String, usize)>,
  pub targets:    Vec<(String, usize)>
}

impl FacetSnapshot {
  pub fn compute(
    index: &TaskIndex,
    state: &FilterState,
    universe: &FacetUniverse
  ) -> Self {
    let counts = |d| {
      facet_counts(
        index, state, universe, d
      )
    };
    Self {
      categories: counts(
        Dimension::Category
      ),
      tags: counts(Dimension::Tag),
      horizons: counts(
        Dimension::Horizon
      ),
      targets: counts(Dimension::Target)
    }
  }

  pub fn get(
    &self,
    dimension: Dimension
  ) -> &[(String, usize)] {
    match dimension {
      | Dimension::Category => {
        &self.categories
      }
      | Dimension::Tag => &self.tags,
      | Dimension::Horizon => {
        &self.horizons
      }
      | Dimension::Target => &self.targets
    }
  }
}
