use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  Local,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "storytask-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "STORYTASK_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "STORYTASK_TIME_CONFIG";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Timezone that decides what "today" means. `None` means the system
/// local timezone.
pub fn configured_timezone()
-> Option<&'static Tz> {
  static CONFIGURED_TZ: OnceLock<
    Option<Tz>
  > = OnceLock::new();
  CONFIGURED_TZ
    .get_or_init(
      resolve_configured_timezone
    )
    .as_ref()
}

#[must_use]
pub fn local_today(
  now: DateTime<Utc>
) -> NaiveDate {
  match configured_timezone() {
    | Some(tz) => {
      now.with_timezone(tz).date_naive()
    }
    | None => {
      now.with_timezone(&Local)
        .date_naive()
    }
  }
}

/// Monday..=Sunday of the week containing `today`. A Sunday belongs to
/// the week that started six days earlier.
#[must_use]
pub fn week_bounds(
  today: NaiveDate
) -> (NaiveDate, NaiveDate) {
  let offset = today
    .weekday()
    .num_days_from_monday()
    as i64;
  let start =
    today - Duration::days(offset);
  let end = start + Duration::days(6);
  (start, end)
}

#[must_use]
pub fn format_deadline(
  deadline: Option<NaiveDate>
) -> String {
  match deadline {
    | Some(date) => {
      date.format("%m/%d").to_string()
    }
    | None => "unscheduled".to_string()
  }
}

fn resolve_configured_timezone()
-> Option<Tz> {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return Some(tz);
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return Some(tz);
  }

  tracing::debug!(
    "no timezone configured; using \
     system local time"
  );
  None
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Parses a deadline as typed by a user. Blank input and `none` clear
/// the deadline.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_deadline_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<Option<NaiveDate>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "" | "none" => return Ok(None),
    | "today" => return Ok(Some(today)),
    | "tomorrow" => {
      return Ok(Some(
        today + Duration::days(1)
      ));
    }
    | "yesterday" => {
      return Ok(Some(
        today - Duration::days(1)
      ));
    }
    | _ => {}
  }

  if let Some(target) =
    parse_weekday_name(&lower)
  {
    return Ok(Some(next_weekday_date(
      today, target
    )));
  }

  let rel_re = Regex::new(
    r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dw])$"
  )
  .map_err(|e| {
    anyhow!(
      "internal regex compile \
       failure: {e}"
    )
  })?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative amount"
      )?;
    let out_of_range = || {
      anyhow!(
        "relative deadline out of \
         range: {token}"
      )
    };
    let days = match caps
      .name("unit")
      .map(|m| m.as_str())
    {
      | Some("w") => num
        .checked_mul(7)
        .ok_or_else(out_of_range)?,
      | _ => num
    };
    let delta = if sign == "-" {
      -days
    } else {
      days
    };
    let shifted = Duration::try_days(
      delta
    )
    .and_then(|span| {
      today.checked_add_signed(span)
    })
    .ok_or_else(out_of_range)?;
    return Ok(Some(shifted));
  }

  let date = NaiveDate::parse_from_str(
    token, "%Y-%m-%d"
  )
  .with_context(|| {
    format!(
      "unrecognized deadline: \
       {token}"
    )
  })?;
  Ok(Some(date))
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}
