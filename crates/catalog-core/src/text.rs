use std::sync::OnceLock;

use deunicode::deunicode;
use regex::Regex;

const TITLE_SMALL_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "of", "to", "in", "on", "for", "with",
];

/// `"PastryDisplay"` -> `"pastry display"`, `"restock_canned_food"` -> `"restock canned food"`.
pub fn spaced_lower(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 8);
    let mut prev: Option<char> = None;

    for ch in name.chars() {
        let ch = if ch == '_' { ' ' } else { ch };
        if ch.is_ascii_uppercase()
            && prev.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit())
        {
            out.push(' ');
        }
        out.push(ch);
        prev = Some(ch);
    }

    out.to_lowercase().trim().to_string()
}

/// `"MakeIceLemonade"` -> `"make_ice_lemonade"`, `"HTMLParser"` -> `"html_parser"`.
pub fn snake_from_task_name(name: &str) -> String {
    let chars: Vec<char> = name
        .trim()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect();

    let mut out = String::with_capacity(chars.len() + 8);
    for (idx, &ch) in chars.iter().enumerate() {
        if ch.is_ascii_uppercase() && idx > 0 {
            let prev = chars[idx - 1];
            let next = chars.get(idx + 1).copied();
            let after_lower = prev.is_ascii_lowercase() || prev.is_ascii_digit();
            let acronym_end = prev.is_ascii_uppercase()
                && next.is_some_and(|n| n.is_ascii_lowercase() || n.is_ascii_digit());
            if after_lower || acronym_end {
                out.push('_');
            }
        }
        out.push(ch.to_ascii_lowercase());
    }

    collapse_char(&out, '_')
}

/// `"Adding Ice to Beverages"` -> `"adding_ice_to_beverages"`.
pub fn activity_folder_from_title(title: &str) -> String {
    let lowered = title.to_lowercase().replace('&', " and ");
    let kept: String = lowered
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();
    let joined = kept
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    collapse_char(&joined, '_')
}

/// Lowercase, diacritics stripped, whitespace collapsed.
pub fn normalize_activity_name(name: &str) -> String {
    collapse_lower(&deunicode(name))
}

pub fn title_case_activity(activity: &str) -> String {
    activity
        .split_whitespace()
        .enumerate()
        .map(|(idx, word)| {
            if word.chars().count() > 1 && word == word.to_uppercase() {
                return word.to_string();
            }
            let lower = word.to_lowercase();
            if idx != 0 && TITLE_SMALL_WORDS.contains(&lower.as_str()) {
                return lower;
            }
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => lower,
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Renders `[*text*]` markers as `[<em>text</em>]` for the preview caption.
pub fn format_caption(desc: &str) -> String {
    let desc = desc.trim();
    match caption_marker() {
        Some(re) => re.replace_all(desc, "[<em>$1</em>]").into_owned(),
        None => desc.to_string(),
    }
}

fn caption_marker() -> Option<&'static Regex> {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    MARKER
        .get_or_init(|| Regex::new(r"\[\*([^*]+)\*\]").ok())
        .as_ref()
}

/// Lowercase with runs of whitespace collapsed to one space.
pub fn collapse_lower(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn format_duration(seconds: Option<f64>) -> String {
    match seconds {
        Some(value) if value.is_finite() => format!("{}s", value.round() as i64),
        _ => "—".to_string(),
    }
}

pub fn format_count(n: usize) -> String {
    if n == 0 {
        String::new()
    } else {
        format!("({n})")
    }
}

pub fn plural_tasks(n: usize) -> String {
    format!("{n} task{}", if n == 1 { "" } else { "s" })
}

fn collapse_char(s: &str, ch: char) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_was = false;
    for c in s.chars() {
        if c == ch {
            if !prev_was {
                out.push(c);
            }
            prev_was = true;
        } else {
            out.push(c);
            prev_was = false;
        }
    }
    out.trim_matches(ch).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spaced_lower_splits_camel_and_snake() {
        assert_eq!(spaced_lower("PastryDisplay"), "pastry display");
        assert_eq!(spaced_lower("restock_canned_food"), "restock canned food");
        assert_eq!(spaced_lower("PickPlaceCounterToCabinet"), "pick place counter to cabinet");
    }

    #[test]
    fn snake_handles_acronyms() {
        assert_eq!(snake_from_task_name("MakeIceLemonade"), "make_ice_lemonade");
        assert_eq!(snake_from_task_name("HTMLParser"), "html_parser");
        assert_eq!(snake_from_task_name("Pre-Soak Pan"), "pre_soak_pan");
    }

    #[test]
    fn folders_and_titles() {
        assert_eq!(activity_folder_from_title("Adding Ice to Beverages"), "adding_ice_to_beverages");
        assert_eq!(activity_folder_from_title("Pots & Pans"), "pots_and_pans");
        assert_eq!(title_case_activity("adding ice to beverages"), "Adding Ice to Beverages");
        assert_eq!(title_case_activity("using the BBQ grill"), "Using the BBQ Grill");
    }

    #[test]
    fn normalize_strips_diacritics() {
        assert_eq!(normalize_activity_name("  Sautéing   Vegetables "), "sauteing vegetables");
    }

    #[test]
    fn caption_marks_placeholders() {
        assert_eq!(format_caption("pick [*the mug*] up"), "pick [<em>the mug</em>] up");
        assert_eq!(format_caption("no markers"), "no markers");
        assert_eq!(format_caption("broken [* marker"), "broken [* marker");
        assert_eq!(
            format_caption(" [*a*] and [*b [*c*] "),
            "[<em>a</em>] and [*b [<em>c</em>]"
        );
        assert_eq!(format_caption("[**]"), "[**]");
    }

    #[test]
    fn collapse_lower_folds_case_and_spacing() {
        assert_eq!(collapse_lower("  Pick the\n Object  "), "pick the object");
    }

    #[test]
    fn duration_and_counts() {
        assert_eq!(format_duration(Some(31.6)), "32s");
        assert_eq!(format_duration(None), "—");
        assert_eq!(format_count(0), "");
        assert_eq!(format_count(4), "(4)");
        assert_eq!(plural_tasks(1), "1 task");
        assert_eq!(plural_tasks(3), "3 tasks");
    }
}
