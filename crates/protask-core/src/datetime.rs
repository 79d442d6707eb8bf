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
  Months,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;

const TIMEZONE_ENV_VAR: &str =
  "PROTASK_TIMEZONE";

pub const DATE_FORMAT: &str =
  "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

static PROJECT_TZ: OnceLock<
  Option<Tz>
> = OnceLock::new();

/// Pins the timezone used to compute
/// "today". The environment variable
/// wins over the configured value; with
/// neither, the system local zone is
/// used. Only the first call has any
/// effect.
pub fn init_project_timezone(
  configured: Option<&str>
) {
  let resolved =
    resolve_project_timezone(
      configured
    );
  if PROJECT_TZ.set(resolved).is_err() {
    tracing::debug!(
      "project timezone already \
       initialised"
    );
  }
}

pub fn project_timezone()
-> Option<&'static Tz> {
  PROJECT_TZ
    .get_or_init(|| {
      resolve_project_timezone(None)
    })
    .as_ref()
}

fn resolve_project_timezone(
  configured: Option<&str>
) -> Option<Tz> {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return Some(tz);
  }

  configured.and_then(|raw| {
    parse_timezone(raw, "config")
  })
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id; \
         using system local time"
      );
      None
    }
  }
}

/// Wall-clock reading of `now` in the
/// project timezone.
#[must_use]
pub fn to_local(
  now: DateTime<Utc>
) -> NaiveDateTime {
  match project_timezone() {
    | Some(tz) => {
      now.with_timezone(tz).naive_local()
    }
    | None => {
      now
        .with_timezone(&Local)
        .naive_local()
    }
  }
}

#[must_use]
pub fn local_today(
  now: DateTime<Utc>
) -> NaiveDate {
  to_local(now).date()
}

#[must_use]
pub fn format_due(
  date: NaiveDate,
  today: NaiveDate
) -> String {
  if date == today {
    "Today".to_string()
  } else if today.succ_opt()
    == Some(date)
  {
    "Tomorrow".to_string()
  } else {
    date.format(DATE_FORMAT).to_string()
  }
}

/// Years a calendar cursor can reach.
pub const CALENDAR_YEARS: (i32, i32) =
  (1, 9999);

/// Moves a (year, month) calendar
/// cursor by `step` months, saturating
/// at the ends of [`CALENDAR_YEARS`].
#[must_use]
pub fn shift_month(
  year: i32,
  month: u32,
  step: i32
) -> (i32, u32) {
  let (first, last) = CALENDAR_YEARS;
  let index = (i64::from(year) * 12
    + i64::from(month) - 1)
    .saturating_add(i64::from(step))
    .clamp(
      i64::from(first) * 12,
      i64::from(last) * 12 + 11
    );
  let year = i32::try_from(
    index.div_euclid(12)
  )
  .unwrap_or(last);
  (
    year,
    index.rem_euclid(12) as u32 + 1
  )
}

#[must_use]
pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  let Some(first) =
    NaiveDate::from_ymd_opt(
      year, month, 1
    )
  else {
    return 0;
  };
  first
    .checked_add_months(Months::new(1))
    .and_then(|next| next.pred_opt())
    .map(|last| last.day())
    .unwrap_or(31)
}

#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_due_date(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return today.succ_opt().ok_or_else(
        || anyhow!("date out of range")
      );
    }
    | "yesterday" => {
      return today.pred_opt().ok_or_else(
        || anyhow!("date out of range")
      );
    }
    | "eom" => {
      let last = days_in_month(
        today.year(),
        today.month()
      );
      return NaiveDate::from_ymd_opt(
        today.year(),
        today.month(),
        last
      )
      .ok_or_else(|| {
        anyhow!("date out of range")
      });
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(next_weekday_date(
      today,
      target_weekday
    ));
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-]?)(?P<num>\d+)(?P<unit>[dwm])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let negative = caps
      .name("sign")
      .is_some_and(|m| m.as_str() == "-");
    let num: u32 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .unwrap_or("d");

    let shifted = match (unit, negative)
    {
      | ("m", false) => today
        .checked_add_months(Months::new(
          num
        )),
      | ("m", true) => today
        .checked_sub_months(Months::new(
          num
        )),
      | (unit, negative) => {
        let days = if unit == "w" {
          i64::from(num) * 7
        } else {
          i64::from(num)
        };
        let delta = Duration::days(
          if negative { -days } else { days }
        );
        today.checked_add_signed(delta)
      }
    };

    return shifted.ok_or_else(|| {
      anyhow!(
        "relative date out of range: \
         {input}"
      )
    });
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token,
      DATE_FORMAT
    )
  {
    return Ok(date);
  }

  Err(anyhow!(
    "unrecognized date expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     today/tomorrow/yesterday/eom, \
     weekday names (e.g. monday), \
     +Nd/+Nw/+Nm, YYYY-MM-DD"
  })
}

pub fn parse_due_time(
  input: &str
) -> anyhow::Result<NaiveTime> {
  let (hour, minute) =
    parse_clock_time(input)
      .ok_or_else(|| {
        anyhow!(
          "unrecognized time: {input} \
           (expected 15:23, 3:23pm or \
           3pm)"
        )
      })?;
  NaiveTime::from_hms_opt(
    hour, minute, 0
  )
  .ok_or_else(|| {
    anyhow!("invalid time: {input}")
  })
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

fn parse_clock_time(
  token: &str
) -> Option<(u32, u32)> {
  let clock_re = Regex::new(
    r"(?i)^(?P<hour>\d{1,2})(:(?P<minute>\d{2}))?\s*(?P<ampm>[ap]m)?$",
  )
  .ok()?;
  let captures =
    clock_re.captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = match captures
    .name("minute")
  {
    | Some(m) => {
      m.as_str().parse::<u32>().ok()?
    }
    | None => 0
  };
  if minute > 59 {
    return None;
  }

  let hour = if let Some(ampm_match) =
    captures.name("ampm")
  {
    let ampm = ampm_match
      .as_str()
      .to_ascii_lowercase();
    if raw_hour == 0 || raw_hour > 12 {
      return None;
    }
    match ampm.as_str() {
      | "am" => {
        if raw_hour == 12 {
          0
        } else {
          raw_hour
        }
      }
      | "pm" => {
        if raw_hour == 12 {
          12
        } else {
          raw_hour + 12
        }
      }
      | _ => return None
    }
  } else {
    // A bare number without am/pm is
    // ambiguous with a day count.
    captures.name("minute")?;
    if raw_hour > 23 {
      return None;
    }
    raw_hour
  };

  Some((hour, minute))
}

/// `YYYY-MM-DD` dates. Empty strings
/// read as absent, which is what a
/// cleared date input produces.
pub mod due_date_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  use super::DATE_FORMAT;

  pub fn serialize<S>(
    date: &Option<NaiveDate>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match date {
      | Some(value) => serializer
        .serialize_str(
          &value
            .format(DATE_FORMAT)
            .to_string()
        ),
      | None => {
        serializer.serialize_none()
      }
    }
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<Option<NaiveDate>, D::Error>
  where
    D: Deserializer<'de>
  {
    let opt =
      Option::<String>::deserialize(
        deserializer
      )?;
    match opt.as_deref().map(str::trim) {
      | None | Some("") => Ok(None),
      | Some(raw) => {
        NaiveDate::parse_from_str(
          raw,
          DATE_FORMAT
        )
        .map(Some)
        .map_err(serde::de::Error::custom)
      }
    }
  }
}

/// `HH:MM` times; `HH:MM:SS` is read
/// too. Empty strings read as absent.
pub mod due_time_serde {
  use chrono::NaiveTime;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  use super::TIME_FORMAT;

  pub fn serialize<S>(
    time: &Option<NaiveTime>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match time {
      | Some(value) => serializer
        .serialize_str(
          &value
            .format(TIME_FORMAT)
            .to_string()
        ),
      | None => {
        serializer.serialize_none()
      }
    }
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<Option<NaiveTime>, D::Error>
  where
    D: Deserializer<'de>
  {
    let opt =
      Option::<String>::deserialize(
        deserializer
      )?;
    match opt.as_deref().map(str::trim) {
      | None | Some("") => Ok(None),
      | Some(raw) => {
        NaiveTime::parse_from_str(
          raw,
          TIME_FORMAT
        )
        .or_else(|_| {
          NaiveTime::parse_from_str(
            raw, "%H:%M:%S"
          )
        })
        .map(Some)
        .map_err(serde::de::Error::custom)
      }
    }
  }
}
