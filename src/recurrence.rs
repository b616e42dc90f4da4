//! Pure functions mapping a schedule definition to a cron expression and to
//! the next instant it fires.
//!
//! Both functions are total given a valid `(schedule_type, schedule_config)`
//! pair; malformed config surfaces as `Error::ScheduleConfigInvalid`. Next-fire
//! computation is delegated to the `cron` crate rather than hand-rolled, so
//! the same evaluation logic that drives production dispatch
//! (`tokio_cron_scheduler`, itself built on `cron`) also answers the advisory
//! `next_run_at` question — including skipping nonexistent monthly dates,
//! which falls out of the crate's own day-of-month matching for free.

use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use crate::error::{Error, Result};
use crate::model::ScheduleType;

/// Builds the 5-field cron expression for a schedule, per the mapping table.
pub fn build_cron_spec(schedule_type: ScheduleType, config: &serde_json::Value) -> Result<String> {
    match schedule_type {
        ScheduleType::Interval => {
            let interval = require_u64(config, "interval")?;
            if interval == 0 {
                return Err(Error::ScheduleConfigInvalid(
                    "interval must be >= 1".to_string(),
                ));
            }
            let unit = require_str(config, "unit")?;
            match unit {
                "minutes" => Ok(format!("*/{interval} * * * *")),
                "hours" => Ok(format!("0 */{interval} * * *")),
                "days" => Ok(format!("0 0 */{interval} * *")),
                other => Err(Error::ScheduleConfigInvalid(format!(
                    "unknown interval unit '{other}'"
                ))),
            }
        }
        ScheduleType::Hourly => Ok("0 * * * *".to_string()),
        ScheduleType::Daily => {
            let (hh, mm) = require_time(config)?;
            Ok(format!("{mm} {hh} * * *"))
        }
        ScheduleType::Weekly => {
            let (hh, mm) = require_time(config)?;
            let days = require_days(config)?;
            let days_str = days
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            Ok(format!("{mm} {hh} * * {days_str}"))
        }
        ScheduleType::Monthly => {
            let (hh, mm) = require_time(config)?;
            let date = require_date(config)?;
            Ok(format!("{mm} {hh} {date} * *"))
        }
    }
}

/// Computes the smallest instant strictly greater than `reference`, in
/// `timezone`, satisfying the cron expression; returns it converted to UTC.
pub fn next_fire_after(
    cron_expr: &str,
    timezone: &str,
    reference: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let tz: Tz = timezone
        .parse()
        .map_err(|_| Error::ScheduleConfigInvalid(format!("unknown timezone '{timezone}'")))?;
    let schedule = parse_schedule(cron_expr)?;
    let reference_in_tz = reference.with_timezone(&tz);
    let next = schedule.after(&reference_in_tz).next().ok_or_else(|| {
        Error::ScheduleConfigInvalid(format!(
            "cron expression '{cron_expr}' has no future occurrence"
        ))
    })?;
    Ok(next.with_timezone(&Utc))
}

/// Validates a cron expression without computing a next-fire instant.
pub fn parse_schedule(cron_expr: &str) -> Result<Schedule> {
    let six_field = to_six_field(cron_expr);
    Schedule::from_str(&six_field)
        .map_err(|e| Error::ScheduleConfigInvalid(format!("invalid cron expression: {e}")))
}

/// The `cron` crate requires a leading seconds field; the mapping table in
/// The mapping functions above produce the conventional 5-field form, so
/// prefix a seconds field of `0`.
fn to_six_field(five_field: &str) -> String {
    format!("0 {five_field}")
}

fn require_u64(config: &serde_json::Value, field: &str) -> Result<u64> {
    config
        .get(field)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| Error::ScheduleConfigInvalid(format!("missing or invalid '{field}'")))
}

fn require_str<'a>(config: &'a serde_json::Value, field: &str) -> Result<&'a str> {
    config
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::ScheduleConfigInvalid(format!("missing or invalid '{field}'")))
}

/// Parses a `"HH:MM"` time field into `(hour, minute)`.
fn require_time(config: &serde_json::Value) -> Result<(u32, u32)> {
    let time = require_str(config, "time")?;
    let (hh, mm) = time
        .split_once(':')
        .ok_or_else(|| Error::ScheduleConfigInvalid(format!("invalid time '{time}'")))?;
    let hh: u32 = hh
        .parse()
        .map_err(|_| Error::ScheduleConfigInvalid(format!("invalid time '{time}'")))?;
    let mm: u32 = mm
        .parse()
        .map_err(|_| Error::ScheduleConfigInvalid(format!("invalid time '{time}'")))?;
    if hh > 23 || mm > 59 {
        return Err(Error::ScheduleConfigInvalid(format!("invalid time '{time}'")));
    }
    Ok((hh, mm))
}

/// Parses a `days` array (0..6, Sun=0) into a sorted, deduplicated set.
fn require_days(config: &serde_json::Value) -> Result<Vec<u32>> {
    let days = config
        .get("days")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::ScheduleConfigInvalid("missing or invalid 'days'".to_string()))?;
    if days.is_empty() {
        return Err(Error::ScheduleConfigInvalid(
            "'days' must be non-empty".to_string(),
        ));
    }
    let mut out = Vec::with_capacity(days.len());
    for d in days {
        let d = d
            .as_u64()
            .ok_or_else(|| Error::ScheduleConfigInvalid("invalid entry in 'days'".to_string()))?;
        if d > 6 {
            return Err(Error::ScheduleConfigInvalid(format!(
                "day '{d}' out of range 0..6"
            )));
        }
        out.push(d as u32);
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

fn require_date(config: &serde_json::Value) -> Result<u32> {
    let date = config
        .get("date")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| Error::ScheduleConfigInvalid("missing or invalid 'date'".to_string()))?;
    if !(1..=31).contains(&date) {
        return Err(Error::ScheduleConfigInvalid(format!(
            "'date' {date} out of range 1..31"
        )));
    }
    Ok(date as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;
    use serde_json::json;

    fn dt(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn daily_schedule_new_york() {
        let cfg = json!({"time": "09:30"});
        let spec = build_cron_spec(ScheduleType::Daily, &cfg).unwrap();
        assert_eq!(spec, "30 9 * * *");

        let ref_instant = Tz::from_str("America/New_York")
            .unwrap()
            .with_ymd_and_hms(2024, 1, 1, 8, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        let next = next_fire_after(&spec, "America/New_York", ref_instant).unwrap();
        assert_eq!(next, dt("2024-01-01T14:30:00Z"));
    }

    #[test]
    fn weekly_schedule_multiple_days() {
        let cfg = json!({"time": "09:00", "days": [1, 3, 5]});
        let spec = build_cron_spec(ScheduleType::Weekly, &cfg).unwrap();
        assert_eq!(spec, "0 9 * * 1,3,5");

        let next = next_fire_after(&spec, "UTC", dt("2024-01-07T12:00:00Z")).unwrap();
        assert_eq!(next, dt("2024-01-08T09:00:00Z"));
    }

    #[test]
    fn monthly_schedule_skips_nonexistent_dates() {
        let cfg = json!({"time": "00:00", "date": 31});
        let spec = build_cron_spec(ScheduleType::Monthly, &cfg).unwrap();
        assert_eq!(spec, "0 0 31 * *");

        let mut ref_instant = dt("2024-01-15T00:00:00Z");
        let expected = [
            "2024-01-31T00:00:00Z",
            "2024-03-31T00:00:00Z",
            "2024-05-31T00:00:00Z",
            "2024-07-31T00:00:00Z",
        ];
        for exp in expected {
            let next = next_fire_after(&spec, "UTC", ref_instant).unwrap();
            assert_eq!(next, dt(exp));
            ref_instant = next;
        }
    }

    #[test]
    fn interval_minutes() {
        let cfg = json!({"interval": 15, "unit": "minutes"});
        let spec = build_cron_spec(ScheduleType::Interval, &cfg).unwrap();
        assert_eq!(spec, "*/15 * * * *");

        let next = next_fire_after(&spec, "UTC", dt("2024-01-01T12:07:00Z")).unwrap();
        assert_eq!(next, dt("2024-01-01T12:15:00Z"));
    }

    #[test]
    fn hourly_schedule() {
        let spec = build_cron_spec(ScheduleType::Hourly, &json!({})).unwrap();
        assert_eq!(spec, "0 * * * *");
        let next = next_fire_after(&spec, "UTC", dt("2024-01-01T12:07:00Z")).unwrap();
        assert_eq!(next, dt("2024-01-01T13:00:00Z"));
    }

    #[test]
    fn missing_interval_unit_is_invalid() {
        let cfg = json!({"interval": 5});
        let err = build_cron_spec(ScheduleType::Interval, &cfg).unwrap_err();
        assert!(matches!(err, Error::ScheduleConfigInvalid(_)));
    }

    #[test]
    fn zero_interval_is_invalid() {
        let cfg = json!({"interval": 0, "unit": "minutes"});
        let err = build_cron_spec(ScheduleType::Interval, &cfg).unwrap_err();
        assert!(matches!(err, Error::ScheduleConfigInvalid(_)));
    }

    #[test]
    fn day_out_of_range_is_invalid() {
        let cfg = json!({"time": "09:00", "days": [7]});
        let err = build_cron_spec(ScheduleType::Weekly, &cfg).unwrap_err();
        assert!(matches!(err, Error::ScheduleConfigInvalid(_)));
    }

    #[test]
    fn unknown_timezone_is_invalid() {
        let err = next_fire_after("0 * * * *", "Mars/Olympus_Mons", dt("2024-01-01T00:00:00Z"))
            .unwrap_err();
        assert!(matches!(err, Error::ScheduleConfigInvalid(_)));
    }
}
