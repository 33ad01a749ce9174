use std::collections::BTreeSet;

use tracing::trace;

use crate::dictionary::Dictionary;

pub const NAV_TAG: &str = "nav";

const DOORISH: &[&str] = &[
    "door",
    "cabinet",
    "fridge",
    "freezer",
    "dishwasher",
    "oven",
    "microwave",
];

struct Words(BTreeSet<String>);

impl Words {
    fn of(text: &str) -> Self {
        Self(
            text.split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
                .map(str::to_lowercase)
                .collect(),
        )
    }

    fn any(&self, words: &[&str]) -> bool {
        words.iter().any(|w| self.0.contains(*w))
    }
}

/// Skill tags implied by a task's name and description.
pub fn infer_skill_tags(name: &str, description: &str) -> Vec<String> {
    let t = name.to_lowercase();
    let d = Words::of(description);
    let name_has = |parts: &[&str]| parts.iter().any(|p| t.contains(p));

    let mut out = Vec::new();

    let is_open = d.any(&["open"]) || t.starts_with("open");
    let is_close = d.any(&["close", "shut"]) || t.starts_with("close") || t.starts_with("reset");
    let is_drawer = d.any(&["drawer"]) || t.contains("drawer");
    let is_doorish = d.any(DOORISH) || name_has(DOORISH);

    if is_open {
        if is_drawer {
            out.push("drawer_open");
        } else if is_doorish {
            out.push("door_open");
        }
    }
    if is_close {
        if is_drawer {
            out.push("drawer_close");
        } else if is_doorish {
            out.push("door_close");
        }
    }

    let has_turn = d.any(&["turn", "twist", "rotate", "adjust"])
        || t.starts_with("turn")
        || t.contains("adjust");
    let knob_ctx = d.any(&["knob", "dial", "temperature", "stove", "burner", "faucet"])
        || name_has(&["temperature", "stove", "toaster", "oven"]);
    let lever_ctx = d.any(&["spout", "lever"]) || name_has(&["spout", "lever"]);

    if has_turn && knob_ctx {
        out.push("knob_twist");
    }
    if has_turn && lever_ctx {
        out.push("lever_turn");
    }

    if d.any(&["press", "push", "button"]) || name_has(&["press", "button"]) {
        out.push("button_press");
    }

    out.into_iter().map(str::to_string).collect()
}

/// Ordered, de-duplicated skill tags for a task.
///
/// Starts from the per-task override (or the default set); an explicitly
/// empty override disables tags entirely. Navigation and inferred skills are
/// appended, removals applied, then keys listed in `tag_order` come first.
pub fn task_tag_keys(
    dict: &Dictionary,
    name: &str,
    navigation: Option<bool>,
    description: &str,
) -> Vec<String> {
    let mut tags = match dict.tags.get(name) {
        Some(overridden) => overridden.clone(),
        None => dict.default_tags.clone(),
    };
    if tags.is_empty() {
        return tags;
    }

    if navigation == Some(true) {
        push_unique(&mut tags, NAV_TAG);
    }
    for inferred in infer_skill_tags(name, description) {
        push_unique(&mut tags, &inferred);
    }

    if let Some(removals) = dict.tag_removals.get(name) {
        tags.retain(|t| !removals.contains(t));
    }

    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(tags.len());
    for key in dict.tag_order.iter().filter(|k| tags.contains(k)) {
        if seen.insert(key.clone()) {
            out.push(key.clone());
        }
    }
    for key in tags {
        if seen.insert(key.clone()) {
            out.push(key);
        }
    }

    trace!(task = %name, tags = ?out, "resolved tag keys");
    out
}

fn push_unique(tags: &mut Vec<String>, key: &str) {
    if !tags.iter().any(|t| t == key) {
        tags.push(key.to_string());
    }
}
