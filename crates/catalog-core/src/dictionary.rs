use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::interval::IntervalSpec;
use crate::record::TaskKind;
use crate::text::normalize_activity_name;

/// Hand-maintained classification data. Lives outside the engine so the
/// tables can be edited without touching matching logic.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Dictionary {
    pub default_tags: Vec<String>,
    pub tag_order: Vec<String>,
    pub tags: BTreeMap<String, Vec<String>>,
    pub tag_removals: BTreeMap<String, Vec<String>>,
    pub skills: Vec<Label>,
    pub categories: Vec<Label>,
    pub activity_categories: BTreeMap<String, String>,
    pub category_rules: Vec<CategoryRule>,
    pub fallback_category: Option<String>,
    pub targets: Vec<TargetList>,
    pub skill_groups: Vec<SkillGroupDef>,
    pub default_skill_group: Option<String>,
    pub horizons: Horizons,
    pub source: SourceLinks,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Label {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryRule {
    pub pattern: String,
    pub category: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetList {
    pub key: String,
    pub label: String,
    pub kind: TaskKind,
    #[serde(default)]
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkillGroupDef {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Horizons {
    pub composite: Option<IntervalSpec>,
    pub atomic: Option<IntervalSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceLinks {
    pub composite_base: Option<String>,
    pub atomic_base: Option<String>,
    pub file_base_overrides: BTreeMap<String, String>,
}

impl Dictionary {
    pub fn parse_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn horizon_spec(&self, kind: TaskKind) -> IntervalSpec {
        match kind {
            TaskKind::Composite => self.horizons.composite.unwrap_or(IntervalSpec::COMPOSITE),
            TaskKind::Atomic => self.horizons.atomic.unwrap_or(IntervalSpec::ATOMIC),
        }
    }

    pub fn targets_for(&self, kind: TaskKind) -> impl Iterator<Item = &TargetList> {
        self.targets.iter().filter(move |t| t.kind == kind)
    }

    /// Target-list keys containing `name`, restricted to lists of `kind`.
    pub fn target_membership(&self, name: &str, kind: TaskKind) -> BTreeSet<String> {
        self.targets_for(kind)
            .filter(|t| t.tasks.iter().any(|task| task == name))
            .map(|t| t.key.clone())
            .collect()
    }

    pub fn category_label<'a>(&'a self, key: &'a str) -> &'a str {
        self.categories
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.label.as_str())
            .unwrap_or(key)
    }

    pub fn skill_label<'a>(&'a self, key: &'a str) -> &'a str {
        self.skills
            .iter()
            .find(|s| s.key == key)
            .map(|s| s.label.as_str())
            .unwrap_or(key)
    }

    pub fn target_label<'a>(&'a self, key: &'a str) -> &'a str {
        self.targets
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.label.as_str())
            .unwrap_or(key)
    }
}

/// Activity title -> category key, via the exact table, then heuristic
/// rules, then the fallback.
#[derive(Debug, Clone)]
pub struct CategoryResolver {
    exact: BTreeMap<String, String>,
    rules: Vec<(Regex, String)>,
    fallback: Option<String>,
}

impl CategoryResolver {
    pub fn new(dict: &Dictionary) -> Self {
        let exact = dict
            .activity_categories
            .iter()
            .map(|(activity, category)| (normalize_activity_name(activity), category.clone()))
            .collect();

        let rules = dict
            .category_rules
            .iter()
            .filter_map(|rule| match Regex::new(&rule.pattern) {
                Ok(re) => Some((re, rule.category.clone())),
                Err(err) => {
                    warn!(pattern = %rule.pattern, error = %err, "skipping invalid category rule");
                    None
                }
            })
            .collect();

        Self {
            exact,
            rules,
            fallback: dict.fallback_category.clone(),
        }
    }

    pub fn resolve(&self, activity: &str) -> Option<String> {
        let normalized = normalize_activity_name(activity);
        if normalized.is_empty() {
            return None;
        }

        if let Some(category) = self.exact.get(&normalized) {
            return Some(category.clone());
        }

        if let Some((re, category)) = self.rules.iter().find(|(re, _)| re.is_match(&normalized)) {
            debug!(activity = %normalized, rule = %re, "category resolved by heuristic rule");
            return Some(category.clone());
        }

        self.fallback.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
default_tags = ["PickPlace"]
tag_order = ["comp_seen_target", "nav", "door_open", "PickPlace"]
fallback_category = "food prep"

[[categories]]
key = "cooking"
label = "Cooking"

[activity_categories]
"sauteing vegetables" = "cooking"

[[category_rules]]
pattern = '\b(wash|clean)\b'
category = "cleaning and sanitizing"

[[category_rules]]
pattern = '(unclosed'
category = "broken"

[[targets]]
key = "comp_seen_target"
label = "Composite-Seen"
kind = "composite"
tasks = ["PrepareCoffee"]

[horizons.atomic]
start = 5.0
end = 40.0
step = 5.0
last_max = 50.0
"#;

    #[test]
    fn parses_sample_dictionary() {
        let dict = Dictionary::parse_toml(SAMPLE).unwrap();
        assert_eq!(dict.default_tags, vec!["PickPlace".to_string()]);
        assert_eq!(dict.category_label("cooking"), "Cooking");
        assert_eq!(dict.category_label("unknown"), "unknown");
        assert_eq!(dict.horizon_spec(TaskKind::Atomic), IntervalSpec::ATOMIC);
        assert_eq!(dict.horizon_spec(TaskKind::Composite), IntervalSpec::COMPOSITE);
    }

    #[test]
    fn target_membership_respects_kind() {
        let dict = Dictionary::parse_toml(SAMPLE).unwrap();
        let composite = dict.target_membership("PrepareCoffee", TaskKind::Composite);
        assert!(composite.contains("comp_seen_target"));
        assert!(dict.target_membership("PrepareCoffee", TaskKind::Atomic).is_empty());
    }

    #[test]
    fn category_resolution_order() {
        let dict = Dictionary::parse_toml(SAMPLE).unwrap();
        let resolver = CategoryResolver::new(&dict);
        assert_eq!(resolver.resolve("Sautéing Vegetables").as_deref(), Some("cooking"));
        // "washing" is not the whole word "wash", so the rule misses.
        assert_eq!(resolver.resolve("Washing Dishes Quickly").as_deref(), Some("food prep"));
        assert_eq!(resolver.resolve("wash the sink").as_deref(), Some("cleaning and sanitizing"));
        assert_eq!(resolver.resolve("Plating Food").as_deref(), Some("food prep"));
        assert_eq!(resolver.resolve("   "), None);
    }
}
