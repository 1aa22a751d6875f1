//! Conversions between wire encodings of dates and times and civil time.

use jiff::Timestamp;
use jiff::civil::{Date, DateTime};
use jiff::tz::TimeZone;
use proton_error::{ProtonResult, proton_bail, proton_err};

use crate::Value;

const DAYS_PER_ERA: i64 = 146_097;
const EPOCH_SHIFT: i64 = 719_468;

/// Convert days since 1970-01-01 into a civil date.
pub fn epoch_days_to_date(days: i64) -> ProtonResult<Date> {
    let z = days + EPOCH_SHIFT;
    let era = z.div_euclid(DAYS_PER_ERA);
    let doe = z.rem_euclid(DAYS_PER_ERA);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    let year = i16::try_from(year).map_err(|_| proton_err!(Data: "day {days} is out of range"))?;
    let month = i8::try_from(month).map_err(|_| proton_err!(Data: "day {days} is out of range"))?;
    let day = i8::try_from(day).map_err(|_| proton_err!(Data: "day {days} is out of range"))?;
    Ok(Date::new(year, month, day)?)
}

/// Convert a civil date into days since 1970-01-01.
pub fn date_to_epoch_days(date: Date) -> i64 {
    let month = i64::from(date.month());
    let year = i64::from(date.year()) - i64::from(month <= 2);
    let era = year.div_euclid(400);
    let yoe = year.rem_euclid(400);
    let mp = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * mp + 2) / 5 + i64::from(date.day()) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * DAYS_PER_ERA + doe - EPOCH_SHIFT
}

fn tick_nanos(precision: u8) -> ProtonResult<i128> {
    if precision > 9 {
        proton_bail!(Data: "datetime64 precision {precision} exceeds 9");
    }
    Ok(10i128.pow(9 - u32::from(precision)))
}

/// Convert ticks of `10^-precision` seconds since the epoch into a timestamp.
pub fn ticks_to_timestamp(ticks: i64, precision: u8) -> ProtonResult<Timestamp> {
    Ok(Timestamp::from_nanosecond(
        i128::from(ticks) * tick_nanos(precision)?,
    )?)
}

/// Convert a timestamp into ticks of `10^-precision` seconds, truncating toward negative infinity.
pub fn timestamp_to_ticks(ts: Timestamp, precision: u8) -> ProtonResult<i64> {
    let ticks = ts.as_nanosecond().div_euclid(tick_nanos(precision)?);
    i64::try_from(ticks)
        .map_err(|_| proton_err!(Data: "{ts} does not fit in datetime64({precision})"))
}

/// The decoded form of a timestamp: naive UTC civil time without a zone, otherwise zoned.
pub fn timestamp_value(ts: Timestamp, tz: Option<&TimeZone>) -> Value {
    match tz {
        None => Value::DateTime(ts.to_zoned(TimeZone::UTC).datetime()),
        Some(tz) => Value::Zoned(ts.to_zoned(tz.clone())),
    }
}

/// Whether a zone is UTC, in which case naive values are returned.
pub fn is_utc(tz: &TimeZone) -> bool {
    tz.iana_name()
        .is_some_and(|name| matches!(name, "UTC" | "Etc/UTC" | "UCT" | "Etc/UCT" | "Zulu"))
}

/// Parse `YYYY-MM-DD[ HH:MM:SS[.fff]]` text as a naive date time.
pub fn parse_datetime(text: &str) -> ProtonResult<DateTime> {
    let text = text.trim();
    if let Ok(dt) = text.replacen(' ', "T", 1).parse::<DateTime>() {
        return Ok(dt);
    }
    let date: Date = text
        .parse()
        .map_err(|_| proton_err!(Data: "`{text}` is not a date time"))?;
    Ok(date.to_datetime(jiff::civil::Time::midnight()))
}

/// The instant of a date time value; naive values are taken as UTC unless a zone is supplied.
pub fn value_timestamp(value: &Value, tz: Option<&TimeZone>) -> ProtonResult<Timestamp> {
    let naive = |dt: &DateTime| -> ProtonResult<Timestamp> {
        Ok(dt.to_zoned(tz.cloned().unwrap_or(TimeZone::UTC))?.timestamp())
    };
    match value {
        Value::Zoned(z) => Ok(z.timestamp()),
        Value::DateTime(dt) => naive(dt),
        Value::Date(d) => naive(&d.to_datetime(jiff::civil::Time::midnight())),
        Value::String(s) => naive(&parse_datetime(s)?),
        Value::Int(secs) => Ok(Timestamp::from_second(*secs)?),
        Value::UInt(secs) => {
            let secs = i64::try_from(*secs).map_err(|_| value.mismatch("datetime"))?;
            Ok(Timestamp::from_second(secs)?)
        }
        other => Err(other.mismatch("datetime")),
    }
}

/// Render a date time as `YYYY-MM-DD HH:MM:SS`, in `tz` when given.
pub fn format_timestamp(value: &Value, tz: Option<&TimeZone>) -> Option<String> {
    let civil = match (value, tz) {
        (Value::Zoned(z), Some(tz)) => z.with_time_zone(tz.clone()).datetime(),
        (Value::Zoned(z), None) => z.datetime(),
        (Value::DateTime(dt), Some(tz)) if !is_utc(tz) => dt
            .to_zoned(TimeZone::UTC)
            .ok()?
            .with_time_zone(tz.clone())
            .datetime(),
        (Value::DateTime(dt), _) => *dt,
        _ => return None,
    };
    Some(civil.strftime("%Y-%m-%d %H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(11322, (2000, 12, 31))]
    #[case(47579, (2100, 4, 8))]
    #[case(0, (1970, 1, 1))]
    #[case(364, (1970, 12, 31))]
    #[case(365, (1971, 1, 1))]
    #[case(500, (1971, 5, 16))]
    #[case(730, (1972, 1, 1))]
    #[case(2250, (1976, 2, 29))]
    #[case(12477, (2004, 2, 29))]
    #[case(12478, (2004, 3, 1))]
    #[case(19378, (2023, 1, 21))]
    #[case(47847, (2101, 1, 1))]
    #[case(54727, (2119, 11, 3))]
    #[case(-18165, (1920, 4, 8))]
    fn epoch_days(#[case] days: i64, #[case] ymd: (i16, i8, i8)) {
        let date = epoch_days_to_date(days).unwrap();
        assert_eq!(date, Date::new(ymd.0, ymd.1, ymd.2).unwrap());
        assert_eq!(date_to_epoch_days(date), days);
    }

    #[test]
    fn ticks() {
        let ts = ticks_to_timestamp(1_700_000_000_123, 3).unwrap();
        assert_eq!(ts.as_second(), 1_700_000_000);
        assert_eq!(timestamp_to_ticks(ts, 3).unwrap(), 1_700_000_000_123);
        assert_eq!(timestamp_to_ticks(ts, 0).unwrap(), 1_700_000_000);
        assert_eq!(timestamp_to_ticks(ticks_to_timestamp(-1, 3).unwrap(), 0).unwrap(), -1);
        assert!(ticks_to_timestamp(1, 10).is_err());
    }

    #[test]
    fn naive_and_zoned() {
        let ts = Timestamp::from_second(0).unwrap();
        assert_eq!(
            timestamp_value(ts, None),
            Value::DateTime(jiff::civil::date(1970, 1, 1).at(0, 0, 0, 0))
        );
        let tz = TimeZone::get("Asia/Shanghai").unwrap();
        let zoned = timestamp_value(ts, Some(&tz));
        assert!(matches!(&zoned, Value::Zoned(z) if z.hour() == 8));
        assert_eq!(value_timestamp(&zoned, None).unwrap(), ts);
        assert!(is_utc(&TimeZone::UTC));
        assert!(!is_utc(&tz));
    }

    #[test]
    fn text_forms() {
        let dt = parse_datetime("2023-01-21 10:11:12").unwrap();
        assert_eq!(
            format_timestamp(&Value::DateTime(dt), None).unwrap(),
            "2023-01-21 10:11:12"
        );
        let dt = parse_datetime("2023-01-21").unwrap();
        assert_eq!(dt.hour(), 0);
        let tz = TimeZone::get("Asia/Shanghai").unwrap();
        assert_eq!(
            format_timestamp(&Value::DateTime(dt), Some(&tz)).unwrap(),
            "2023-01-21 08:00:00"
        );
    }
}
