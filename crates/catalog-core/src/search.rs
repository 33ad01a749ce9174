use std::cmp::Ordering;

use tracing::debug;

use crate::facet::{FilterState, passes};
use crate::record::{TaskIndex, TaskRecord};
use crate::text::spaced_lower;

pub const DEFAULT_SUGGEST_LIMIT: usize = 12;

/// Lowercased, whitespace-split, de-duplicated in first-seen order.
pub fn unique_tokens(query: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in query.to_lowercase().split_whitespace() {
        if !out.iter().any(|t| t == token) {
            out.push(token.to_string());
        }
    }
    out
}

struct Ranked<'a> {
    record: &'a TaskRecord,
    name_lower: String,
    in_name: bool,
    exact: bool,
    prefix: bool,
    position: Option<usize>,
}

impl Ranked<'_> {
    fn cmp_rank(&self, other: &Self) -> Ordering {
        // `true` ranks first for the boolean criteria.
        other
            .in_name
            .cmp(&self.in_name)
            .then(other.exact.cmp(&self.exact))
            .then(other.prefix.cmp(&self.prefix))
            .then_with(|| match (self.position, other.position) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then(self.record.name.len().cmp(&other.record.name.len()))
    }
}

/// Typeahead matches for `query` among records that already pass `state`.
/// Every token must occur in the record's search text.
#[tracing::instrument(skip(index, state))]
pub fn suggest<'a>(
    index: &'a TaskIndex,
    state: &FilterState,
    query: &str,
    limit: usize,
) -> Vec<&'a TaskRecord> {
    let tokens = unique_tokens(query);
    let Some(first) = tokens.first() else {
        return vec![];
    };
    let query = query.trim().to_lowercase();

    let mut ranked: Vec<Ranked<'a>> = index
        .iter()
        .filter(|r| passes(r, state))
        .filter(|r| tokens.iter().all(|t| r.search_text.contains(t.as_str())))
        .map(|record| {
            let name_lower = record.name.to_lowercase();
            let name_text = record.name_text();
            let spaced = spaced_lower(&record.name);
            Ranked {
                in_name: tokens.iter().all(|t| name_text.contains(t.as_str())),
                exact: name_lower == query,
                prefix: name_lower.starts_with(first.as_str()) || spaced.starts_with(&query),
                position: name_lower.find(first.as_str()),
                name_lower,
                record,
            }
        })
        .collect();

    ranked.sort_by(|a, b| a.cmp_rank(b));
    ranked.truncate(limit);

    debug!(
        matches = ranked.len(),
        top = ?ranked.first().map(|r| r.name_lower.as_str()),
        "ranked suggestions"
    );
    ranked.into_iter().map(|r| r.record).collect()
}
