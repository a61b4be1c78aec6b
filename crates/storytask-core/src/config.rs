use std::collections::HashMap;
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

use crate::app::{
  AppSettings,
  Placement,
  Variant
};
use crate::store::RestStoreConfig;

const RC_ENV_VAR: &str = "STORYTASKRC";
const URL_ENV_VAR: &str =
  "STORYTASK_URL";
const KEY_ENV_VAR: &str =
  "STORYTASK_KEY";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "variant".to_string(),
      "story".to_string()
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
    );
    map.insert(
      "store.timeout".to_string(),
      DEFAULT_TIMEOUT_SECS.to_string()
    );
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

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading storytaskrc");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no storytaskrc found; using \
         defaults"
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

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  /// Variant defaults, then any explicit `insert.at`, `optimistic` and
  /// `task.color` keys.
  pub fn app_settings(
    &self
  ) -> anyhow::Result<AppSettings> {
    let variant = match self
      .get("variant")
      .unwrap_or_default()
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "" | "story" => Variant::Story,
      | "minimal" => Variant::Minimal,
      | other => {
        return Err(anyhow!(
          "invalid variant: {other}"
        ));
      }
    };

    let mut settings =
      AppSettings::for_variant(variant);

    if let Some(raw) =
      self.get("insert.at")
    {
      settings.insert_at = match raw
        .trim()
        .to_ascii_lowercase()
        .as_str()
      {
        | "end" => Placement::End,
        | "front" => Placement::Front,
        | other => {
          return Err(anyhow!(
            "invalid insert.at: \
             {other}"
          ));
        }
      };
    }

    if let Some(optimistic) =
      self.get_bool("optimistic")
    {
      settings.optimistic = optimistic;
    }

    if let Some(raw) =
      self.get("task.color")
    {
      settings.default_color = raw
        .parse()
        .context("invalid task.color")?;
    }

    Ok(settings)
  }

  /// Connection settings; `STORYTASK_URL` / `STORYTASK_KEY` win over the
  /// rc file.
  pub fn store_config(
    &self
  ) -> anyhow::Result<RestStoreConfig> {
    let base_url = env_or(
      URL_ENV_VAR,
      self.get("store.url")
    )
    .ok_or_else(|| {
      anyhow!(
        "no store url configured; set \
         {URL_ENV_VAR} or store.url"
      )
    })?;
    let api_key = env_or(
      KEY_ENV_VAR,
      self.get("store.key")
    )
    .ok_or_else(|| {
      anyhow!(
        "no store key configured; set \
         {KEY_ENV_VAR} or store.key"
      )
    })?;
    let timeout_secs = match self
      .get("store.timeout")
    {
      | Some(raw) => {
        raw.trim().parse::<u64>().with_context(|| {
          format!(
            "invalid store.timeout: \
             {raw}"
          )
        })?
      }
      | None => DEFAULT_TIMEOUT_SECS
    };

    Ok(RestStoreConfig {
      base_url,
      api_key,
      timeout: Duration::from_secs(
        timeout_secs
      )
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
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once(" # ")
      {
        line = before.trim();
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
      trace!(key = %key, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

fn env_or(
  var: &str,
  fallback: Option<String>
) -> Option<String> {
  std::env::var(var)
    .ok()
    .filter(|v| !v.trim().is_empty())
    .or(fallback)
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
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
    std::env::var(RC_ENV_VAR)
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
    warn!(
      "cannot determine home \
       directory"
    );
    return Ok(None);
  };
  let candidate =
    home.join(".storytaskrc");
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

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
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

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
