use std::collections::BTreeMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::record::TaskKind;
use crate::subtasks::{
  DEFAULT_DOMAIN_MAX,
  DEFAULT_DOMAIN_MIN,
  SubtaskRange
};
use crate::video::{
  VideoHosting,
  loader::DEFAULT_TIMEOUT,
  sources::{
    DEFAULT_PREFIX,
    DEFAULT_PUBLIC_HOST
  }
};

pub const VIDEO_BASE_ENV: &str =
  "CATALOG_VIDEO_BASE_URL";
pub const RC_ENV: &str = "CATALOGRC";

#[derive(Debug, Clone)]
pub struct Config {
  map:              BTreeMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = BTreeMap::new();
    for (k, v) in [
      ("data.location", "data"),
      ("page", "composite"),
      ("atomic.grouping", "skill"),
      ("color", "on"),
      ("video.prefix", DEFAULT_PREFIX),
      (
        "video.default_host",
        DEFAULT_PUBLIC_HOST
      ),
      ("video.timeout", "20"),
      ("suggest.limit", "12"),
      ("subtasks.min", "2"),
      ("subtasks.max", "16")
    ] {
      map.insert(
        k.to_string(),
        v.to_string()
      );
    }
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(
      rc_override
    )?;
    if let Some(path) = rc {
      info!(catalogrc = %path.display(), "loading catalogrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no catalogrc found; using \
         defaults"
      );
    }

    if let Ok(base) =
      std::env::var(VIDEO_BASE_ENV)
    {
      debug!(base = %base, "video base url from environment");
      cfg.map.insert(
        "video.base_url".to_string(),
        base
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn set(
    &mut self,
    key: &str,
    value: &str
  ) {
    self.map.insert(
      key.to_string(),
      value.to_string()
    );
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  pub fn data_dir(&self) -> PathBuf {
    let raw = self
      .get("data.location")
      .unwrap_or_else(|| {
        "data".to_string()
      });
    expand_tilde(Path::new(&raw))
  }

  pub fn page(
    &self
  ) -> anyhow::Result<TaskKind> {
    let raw = self
      .get("page")
      .unwrap_or_default();
    TaskKind::parse(&raw).ok_or_else(
      || {
        anyhow!(
          "invalid page '{raw}'; \
           expected composite or \
           atomic"
        )
      }
    )
  }

  /// Unset means on; anything that is
  /// not a recognised switch is an error.
  pub fn color(
    &self
  ) -> anyhow::Result<bool> {
    match self.get("color") {
      | None => Ok(true),
      | Some(raw) => parse_bool(&raw)
        .ok_or_else(|| {
          anyhow!(
            "invalid color setting: \
             {raw}"
          )
        })
    }
  }

  pub fn hosting(
    &self
  ) -> VideoHosting {
    let base =
      self.get("video.base_url");
    let host = self
      .get("video.default_host")
      .unwrap_or_else(|| {
        DEFAULT_PUBLIC_HOST.to_string()
      });
    let prefix = self
      .get("video.prefix")
      .unwrap_or_else(|| {
        DEFAULT_PREFIX.to_string()
      });
    VideoHosting::new(
      base.as_deref(),
      &host,
      &prefix
    )
  }

  pub fn video_timeout(
    &self
  ) -> Duration {
    match self
      .get("video.timeout")
      .map(|v| v.trim().parse::<f64>())
    {
      | Some(Ok(secs))
        if secs.is_finite()
          && secs > 0.0 =>
      {
        Duration::from_secs_f64(secs)
      }
      | Some(_) => {
        warn!(
          "invalid video.timeout; \
           using default"
        );
        DEFAULT_TIMEOUT
      }
      | None => DEFAULT_TIMEOUT
    }
  }

  pub fn suggest_limit(
    &self
  ) -> usize {
    self
      .get_usize("suggest.limit")
      .unwrap_or(
        crate::search::DEFAULT_SUGGEST_LIMIT
      )
  }

  /// Valid subtask-input domain. A
  /// crossed or unparsable pair falls
  /// back to the default domain.
  pub fn subtask_domain(
    &self
  ) -> SubtaskRange {
    let lo = self
      .get_usize("subtasks.min")
      .and_then(|v| {
        u32::try_from(v).ok()
      });
    let hi = self
      .get_usize("subtasks.max")
      .and_then(|v| {
        u32::try_from(v).ok()
      });
    match (lo, hi) {
      | (Some(lo), Some(hi))
        if lo <= hi =>
      {
        SubtaskRange::new(lo, hi)
      }
      | _ => {
        warn!(
          ?lo,
          ?hi,
          "invalid subtasks domain; \
           using default"
        );
        SubtaskRange::new(
          DEFAULT_DOMAIN_MIN,
          DEFAULT_DOMAIN_MAX
        )
      }
    }
  }

  fn get_usize(
    &self,
    key: &str
  ) -> Option<usize> {
    self
      .map
      .get(key)
      .and_then(|v| {
        v.trim().parse().ok()
      })
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line = match raw_line
        .split_once('#')
      {
        | Some((before, _)) => {
          before.trim()
        }
        | None => raw_line.trim()
      };
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    debug!(
      "cannot determine home \
       directory; skipping \
       ~/.catalogrc"
    );
    return Ok(None);
  };
  let candidate =
    home.join(".catalogrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

pub fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

pub fn parse_bool(
  s: &str
) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}
