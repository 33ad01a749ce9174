use std::fmt;

use tracing::debug;

use crate::record::TaskKind;

pub const DEFAULT_PUBLIC_HOST: &str = "https://pub-4433dcd10060475196ea5832312785f9.r2.dev";
pub const DEFAULT_PREFIX: &str = "robocasa365-videos";

const CACHE_BUST_PARAM: &str = "cb=";

/// Where preview videos live. A custom base replaces the public host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoHosting {
    pub custom_base: Option<String>,
    pub default_host: String,
    pub prefix: String,
}

impl Default for VideoHosting {
    fn default() -> Self {
        Self {
            custom_base: None,
            default_host: DEFAULT_PUBLIC_HOST.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl VideoHosting {
    /// Blank custom bases count as unset.
    pub fn new(custom_base: Option<&str>, default_host: &str, prefix: &str) -> Self {
        Self {
            custom_base: custom_base
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(str::to_string),
            default_host: default_host.trim().to_string(),
            prefix: prefix.trim().trim_matches('/').to_string(),
        }
    }

    pub fn is_custom(&self) -> bool {
        self.custom_base.is_some()
    }

    /// Candidate URLs for a task's preview, in the order they are tried.
    pub fn sources_for(&self, task: &str, kind: TaskKind) -> Vec<String> {
        let Some(stem) = video_file_stem(task, kind) else {
            return vec![];
        };
        let safe = urlencoding::encode(&stem);

        let mut out = Vec::with_capacity(2);
        match &self.custom_base {
            Some(base) => {
                let base = base.trim_end_matches('/');
                out.push(format!("{base}/{safe}.mp4"));
                if !self.prefix.is_empty() && !base.ends_with(&format!("/{}", self.prefix)) {
                    out.push(format!("{base}/{}/{safe}.mp4", self.prefix));
                }
            }
            None => {
                let host = self.default_host.trim_end_matches('/');
                out.push(format!("{host}/{safe}.mp4"));
                if !self.prefix.is_empty() {
                    out.push(format!("{host}/{}/{safe}.mp4", self.prefix));
                }
            }
        }

        debug!(task = %task, sources = ?out, "resolved video sources");
        out
    }

    pub fn unavailable_reason(&self) -> UnavailableReason {
        if self.is_custom() {
            UnavailableReason::CustomBase {
                prefix: self.prefix.clone(),
            }
        } else {
            UnavailableReason::PublicHost {
                host: self.default_host.clone(),
                prefix: self.prefix.clone(),
            }
        }
    }
}

/// File stem for a task's video: `*` markers stripped, trimmed. Atomic
/// pick-and-place clips are stored under a `PnP` prefix.
pub fn video_file_stem(task: &str, kind: TaskKind) -> Option<String> {
    let stem = task.replace('*', "");
    let stem = stem.trim();
    if stem.is_empty() {
        return None;
    }
    if kind == TaskKind::Atomic
        && let Some(rest) = stem.strip_prefix("PickPlace")
    {
        return Some(format!("PnP{rest}"));
    }
    Some(stem.to_string())
}

/// `src` with a uniquifying `cb` query parameter, or `None` when the URL
/// was already busted.
pub fn cache_bust(src: &str, stamp_millis: i64) -> Option<String> {
    if src.contains(CACHE_BUST_PARAM) {
        return None;
    }
    let sep = if src.contains('?') { '&' } else { '?' };
    Some(format!("{src}{sep}{CACHE_BUST_PARAM}{stamp_millis}"))
}

/// Why every candidate failed. The two hosting setups need different fixes,
/// so they get different advisories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    CustomBase { prefix: String },
    PublicHost { host: String, prefix: String },
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CustomBase { prefix } => write!(
                f,
                "Demo video unavailable. The video could not be loaded from the configured \
                 base URL. Please verify the URL is correct and points to where the .mp4 files \
                 are stored (some setups use a /{prefix} prefix)."
            ),
            Self::PublicHost { host, prefix } => write!(
                f,
                "Demo video unavailable. Could not load the demo from the public host. If your \
                 videos are hosted elsewhere, set video.base_url (or CATALOG_VIDEO_BASE_URL) to \
                 a base like \"{host}\" (or \".../{prefix}\" if your objects use that prefix)."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_host_tries_flat_then_prefixed() {
        let hosting = VideoHosting::default();
        assert_eq!(
            hosting.sources_for("MakeIceLemonade", TaskKind::Composite),
            vec![
                format!("{DEFAULT_PUBLIC_HOST}/MakeIceLemonade.mp4"),
                format!("{DEFAULT_PUBLIC_HOST}/{DEFAULT_PREFIX}/MakeIceLemonade.mp4"),
            ]
        );
    }

    #[test]
    fn custom_base_skips_prefix_it_already_has() {
        let hosting = VideoHosting::new(
            Some("https://cdn.example.org/robocasa365-videos//"),
            DEFAULT_PUBLIC_HOST,
            DEFAULT_PREFIX,
        );
        assert_eq!(
            hosting.sources_for("Stir Soup*", TaskKind::Composite),
            vec!["https://cdn.example.org/robocasa365-videos/Stir%20Soup.mp4".to_string()]
        );

        let hosting = VideoHosting::new(Some("https://cdn.example.org"), DEFAULT_PUBLIC_HOST, DEFAULT_PREFIX);
        assert_eq!(hosting.sources_for("A", TaskKind::Composite).len(), 2);
        assert!(matches!(hosting.unavailable_reason(), UnavailableReason::CustomBase { .. }));
    }

    #[test]
    fn blank_base_is_public_host() {
        let hosting = VideoHosting::new(Some("   "), DEFAULT_PUBLIC_HOST, DEFAULT_PREFIX);
        assert!(!hosting.is_custom());
        assert!(hosting.unavailable_reason().to_string().contains("public host"));
    }

    #[test]
    fn atomic_pick_place_uses_pnp_stem() {
        assert_eq!(
            video_file_stem("PickPlaceCounterToDrawer", TaskKind::Atomic).as_deref(),
            Some("PnPCounterToDrawer")
        );
        assert_eq!(
            video_file_stem("PickPlaceCounterToDrawer", TaskKind::Composite).as_deref(),
            Some("PickPlaceCounterToDrawer")
        );
        assert_eq!(video_file_stem(" * ", TaskKind::Atomic), None);
    }

    #[test]
    fn cache_bust_appends_once() {
        assert_eq!(cache_bust("https://h/a.mp4", 7).as_deref(), Some("https://h/a.mp4?cb=7"));
        assert_eq!(cache_bust("https://h/a.mp4?x=1", 7).as_deref(), Some("https://h/a.mp4?x=1&cb=7"));
        assert_eq!(cache_bust("https://h/a.mp4?cb=1", 7), None);
    }
}
