use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, anyhow};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dictionary::Dictionary;

pub const ATTRIBUTES_FILE: &str = "task_attributes.json";
pub const COMPOSITE_LENGTHS_FILE: &str = "episode_lengths.json";
pub const ATOMIC_LENGTHS_FILE: &str = "atomic_episode_lengths.json";
pub const FIXTURE_INDEX_FILE: &str = "fixture_index.json";
pub const DICTIONARY_FILE: &str = "dictionary.toml";

/// Per-task attributes. Every field is optional in the file and loosely
/// typed; accessors normalize.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaskAttributes {
    pub description: String,
    pub mobile: Option<Value>,
    pub subtasks: Option<Value>,
    pub activity: Option<String>,
}

impl TaskAttributes {
    pub fn navigation(&self) -> Option<bool> {
        match self.mobile.as_ref()? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "yes" | "true" | "y" => Some(true),
                "no" | "false" | "n" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn subtask_count(&self) -> Option<u32> {
        match self.subtasks.as_ref()? {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn is_atomic(&self) -> bool {
        self.activity
            .as_deref()
            .is_some_and(|a| a.trim().eq_ignore_ascii_case("atomic"))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub id: String,
    pub label: String,
    pub tasks: Vec<FixtureTask>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FixtureTask {
    pub name: String,
    pub source: Option<String>,
    pub line: Option<u32>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FixtureIndexFile {
    fixtures: Vec<Fixture>,
}

/// Everything read from a data directory. Missing or malformed files leave
/// their table empty; nothing here fails on bad metadata.
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    pub attributes: BTreeMap<String, TaskAttributes>,
    pub composite_lengths: BTreeMap<String, f64>,
    pub atomic_lengths: BTreeMap<String, f64>,
    pub fixtures: Vec<Fixture>,
    pub dictionary: Dictionary,
}

impl Bundle {
    #[tracing::instrument(skip(data_dir), fields(data_dir = %data_dir.display()))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        if data_dir.exists() && !data_dir.is_dir() {
            return Err(anyhow!(
                "data location is not a directory: {}",
                data_dir.display()
            ));
        }
        if !data_dir.exists() {
            warn!(data_dir = %data_dir.display(), "data directory missing; catalog will be empty");
        }

        let attributes = load_json_or_default(&data_dir.join(ATTRIBUTES_FILE), attribute_table);
        let composite_lengths =
            load_json_or_default(&data_dir.join(COMPOSITE_LENGTHS_FILE), length_table);
        let atomic_lengths =
            load_json_or_default(&data_dir.join(ATOMIC_LENGTHS_FILE), length_table);
        let fixtures = load_json_or_default(&data_dir.join(FIXTURE_INDEX_FILE), |value| {
            Ok(serde_json::from_value::<FixtureIndexFile>(value)?.fixtures)
        });
        let dictionary = load_dictionary(&data_dir.join(DICTIONARY_FILE));

        info!(
            attributes = attributes.len(),
            composite_lengths = composite_lengths.len(),
            atomic_lengths = atomic_lengths.len(),
            fixtures = fixtures.len(),
            "opened data bundle"
        );

        Ok(Self {
            attributes,
            composite_lengths,
            atomic_lengths,
            fixtures,
            dictionary,
        })
    }

    /// Mean composite episode length, rounded to whole seconds.
    pub fn composite_length(&self, name: &str) -> Option<f64> {
        self.composite_lengths.get(name).map(|s| s.round())
    }

    /// Atomic lengths fall back to the composite table.
    pub fn atomic_length(&self, name: &str) -> Option<f64> {
        self.atomic_lengths
            .get(name)
            .or_else(|| self.composite_lengths.get(name))
            .map(|s| s.round())
    }
}

fn load_json_or_default<T, F>(path: &Path, convert: F) -> T
where
    T: Default,
    F: FnOnce(Value) -> anyhow::Result<T>,
{
    if !path.exists() {
        debug!(file = %path.display(), "bundle file absent");
        return T::default();
    }

    let parsed = fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))
        .and_then(|raw| {
            serde_json::from_str::<Value>(&raw)
                .with_context(|| format!("failed parsing {}", path.display()))
        })
        .and_then(convert);

    match parsed {
        Ok(table) => table,
        Err(err) => {
            warn!(file = %path.display(), error = %format!("{err:#}"), "ignoring malformed bundle file");
            T::default()
        }
    }
}

fn load_dictionary(path: &Path) -> Dictionary {
    if !path.exists() {
        debug!(file = %path.display(), "no classification dictionary");
        return Dictionary::default();
    }

    let parsed = fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))
        .and_then(|raw| {
            Dictionary::parse_toml(&raw).with_context(|| format!("failed parsing {}", path.display()))
        });

    match parsed {
        Ok(dict) => dict,
        Err(err) => {
            warn!(file = %path.display(), error = %format!("{err:#}"), "ignoring malformed dictionary");
            Dictionary::default()
        }
    }
}

/// Entries that fail to deserialize are skipped one by one.
fn attribute_table(value: Value) -> anyhow::Result<BTreeMap<String, TaskAttributes>> {
    let Value::Object(map) = value else {
        return Err(anyhow!("expected an object keyed by task name"));
    };
    Ok(map
        .into_iter()
        .filter_map(|(name, entry)| lenient_entry(&name, entry).map(|attrs| (name, attrs)))
        .collect())
}

fn lenient_entry<T: DeserializeOwned>(name: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!(task = %name, error = %err, "skipping malformed entry");
            None
        }
    }
}

/// `{ "tasks": { "<Task>": { "mean_seconds": f64 } } }`; a bare number per
/// task is accepted too.
fn length_table(value: Value) -> anyhow::Result<BTreeMap<String, f64>> {
    let tasks = value
        .get("tasks")
        .and_then(Value::as_object)
        .ok_or_else(|| anyhow!("missing `tasks` object"))?;

    Ok(tasks
        .iter()
        .filter_map(|(name, entry)| {
            let seconds = entry
                .get("mean_seconds")
                .and_then(Value::as_f64)
                .or_else(|| entry.as_f64())
                .filter(|s| s.is_finite());
            seconds.map(|s| (name.clone(), s))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_normalize_loose_fields() {
        let attrs: TaskAttributes = serde_json::from_value(serde_json::json!({
            "description": "x",
            "mobile": "Yes",
            "subtasks": "7",
            "activity": "Atomic"
        }))
        .unwrap();
        assert_eq!(attrs.navigation(), Some(true));
        assert_eq!(attrs.subtask_count(), Some(7));
        assert!(attrs.is_atomic());

        let attrs = TaskAttributes {
            mobile: Some(serde_json::json!("maybe")),
            subtasks: Some(serde_json::json!(-3)),
            ..TaskAttributes::default()
        };
        assert_eq!(attrs.navigation(), None);
        assert_eq!(attrs.subtask_count(), None);
    }

    #[test]
    fn length_table_skips_unusable_entries() {
        let table = length_table(serde_json::json!({
            "tasks": {
                "A": { "mean_seconds": 31.6 },
                "B": 12.0,
                "C": { "mean_seconds": "slow" }
            }
        }))
        .unwrap();
        assert_eq!(table.get("A"), Some(&31.6));
        assert_eq!(table.get("B"), Some(&12.0));
        assert!(!table.contains_key("C"));
        assert!(length_table(serde_json::json!([1, 2])).is_err());
    }

    #[test]
    fn atomic_lengths_fall_back_to_composite() {
        let bundle = Bundle {
            composite_lengths: BTreeMap::from([("A".to_string(), 10.4), ("B".to_string(), 3.0)]),
            atomic_lengths: BTreeMap::from([("A".to_string(), 7.6)]),
            ..Bundle::default()
        };
        assert_eq!(bundle.atomic_length("A"), Some(8.0));
        assert_eq!(bundle.atomic_length("B"), Some(3.0));
        assert_eq!(bundle.composite_length("A"), Some(10.0));
        assert_eq!(bundle.atomic_length("Z"), None);
    }

    #[test]
    fn missing_directory_yields_empty_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = Bundle::open(&dir.path().join("nope")).unwrap();
        assert!(bundle.attributes.is_empty());
        assert!(bundle.fixtures.is_empty());
    }

    #[test]
    fn malformed_files_degrade_to_empty_tables() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(ATTRIBUTES_FILE), "{ not json").unwrap();
        fs::write(dir.path().join(DICTIONARY_FILE), "default_tags = 3").unwrap();
        fs::write(
            dir.path().join(COMPOSITE_LENGTHS_FILE),
            r#"{"tasks": {"A": {"mean_seconds": 20}}}"#,
        )
        .unwrap();

        let bundle = Bundle::open(dir.path()).unwrap();
        assert!(bundle.attributes.is_empty());
        assert!(bundle.dictionary.default_tags.is_empty());
        assert_eq!(bundle.composite_length("A"), Some(20.0));
    }
}
