use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

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

use crate::festival::MinorNewYearMode;
use crate::lunar::{
  FIRST_LUNAR_YEAR,
  LAST_LUNAR_YEAR
};

const RC_ENV: &str = "FESTPLANRC";
const RC_FILE: &str = ".festplanrc";
const DATA_DIR: &str = ".festplan";

pub const DATA_LOCATION_KEY: &str =
  "data.location";
pub const DEFAULT_COMMAND_KEY: &str =
  "default.command";
pub const COLOR_KEY: &str = "color";
pub const MODE_KEY: &str =
  "minor_new_year.mode";
pub const HOLIDAY_YEAR_KEY: &str =
  "holiday.year";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      DATA_LOCATION_KEY.to_string(),
      format!("~/{DATA_DIR}")
    );
    map.insert(
      DEFAULT_COMMAND_KEY.to_string(),
      "timeline".to_string()
    );
    map.insert(
      COLOR_KEY.to_string(),
      "on".to_string()
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

    let rc = resolve_rc_path(
      rc_override
    )?;
    if let Some(path) = rc {
      info!(festplanrc = %path.display(), "loading festplanrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no festplanrc found; using \
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

  pub fn color_enabled(&self) -> bool {
    self
      .get_bool(COLOR_KEY)
      .unwrap_or(true)
  }

  /// Mode forced by configuration, if
  /// any. Persisted settings apply
  /// otherwise.
  pub fn minor_new_year_mode(
    &self
  ) -> anyhow::Result<
    Option<MinorNewYearMode>
  > {
    self
      .get(MODE_KEY)
      .filter(|v| !v.trim().is_empty())
      .map(|v| {
        v.parse().with_context(|| {
          format!(
            "invalid {MODE_KEY} in \
             config"
          )
        })
      })
      .transpose()
  }

  /// Lunar year the timeline and
  /// countdown should show instead of
  /// the upcoming one.
  pub fn holiday_year(
    &self
  ) -> anyhow::Result<Option<i32>> {
    let Some(raw) = self
      .get(HOLIDAY_YEAR_KEY)
      .filter(|v| !v.trim().is_empty())
    else {
      return Ok(None);
    };
    let year: i32 =
      raw.trim().parse().with_context(
        || {
          format!(
            "invalid \
             {HOLIDAY_YEAR_KEY}: {raw}"
          )
        }
      )?;
    if !(FIRST_LUNAR_YEAR + 1
      ..=LAST_LUNAR_YEAR)
      .contains(&year)
    {
      return Err(anyhow!(
        "{HOLIDAY_YEAR_KEY} {year} is \
         outside {}..={}",
        FIRST_LUNAR_YEAR + 1,
        LAST_LUNAR_YEAR
      ));
    }
    Ok(Some(year))
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
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
      let line = raw_line
        .split_once('#')
        .map_or(raw_line, |(before, _)| {
          before
        })
        .trim();
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
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get(DATA_LOCATION_KEY)
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    home_dir()?.join(DATA_DIR)
  };

  debug!(dir = %dir.display(), "resolved data directory");
  Ok(dir)
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
    if rc_env.is_empty()
      || rc_env == "/dev/null"
    {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let candidate =
    home_dir()?.join(RC_FILE);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn home_dir() -> anyhow::Result<PathBuf>
{
  dirs::home_dir().ok_or_else(|| {
    anyhow!(
      "cannot determine home directory"
    )
  })
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
