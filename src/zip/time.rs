//! Timestamp conversions.
//!
//! Two representations appear in an archive:
//!
//! - the packed MS-DOS date/time of the fixed headers, 2-second resolution,
//!   years 1980 to 2106;
//! - Windows file times (100-nanosecond ticks since 1601-01-01 UTC) carried in
//!   the extended timestamp extra field.
//!
//! DOS values carry no zone; they are read and written as UTC.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};

/// Seconds between 1601-01-01 and 1970-01-01.
const FILETIME_UNIX_OFFSET: i64 = 11_644_473_600;
const TICKS_PER_SECOND: i64 = 10_000_000;

const DOS_MIN_YEAR: i32 = 1980;
/// First year the DOS field cannot hold; readers treat it as degenerate.
const DOS_MAX_YEAR: i32 = 2107;

/// Pack a timestamp into the 32-bit DOS date/time field (date in the high half).
///
/// Timestamps outside the representable range are clamped to its ends.
pub fn to_dos(dt: &DateTime<Utc>) -> u32 {
    if dt.year() < DOS_MIN_YEAR {
        return (1 << 16) | (1 << 21);
    }
    if dt.year() >= DOS_MAX_YEAR {
        return pack(DOS_MAX_YEAR as u32 - 1, 12, 31, 23, 59, 58);
    }
    pack(
        dt.year() as u32,
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
    )
}

fn pack(year: u32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> u32 {
    (second / 2)
        | (minute << 5)
        | (hour << 11)
        | (day << 16)
        | (month << 21)
        | ((year - DOS_MIN_YEAR as u32) << 25)
}

/// Unpack a DOS date/time field.
///
/// Returns `None` for degenerate values (zero month or day, the reserved year
/// 2107, or fields that do not form a real calendar date).
pub fn from_dos(value: u32) -> Option<DateTime<Utc>> {
    let year = (value >> 25) as i32 + DOS_MIN_YEAR;
    let month = (value >> 21) & 0x0F;
    let day = (value >> 16) & 0x1F;
    let hour = (value >> 11) & 0x1F;
    let minute = (value >> 5) & 0x3F;
    let second = (value & 0x1F) * 2;

    if month == 0 || day == 0 || year >= DOS_MAX_YEAR {
        return None;
    }

    NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(hour, minute, second)
        .map(|naive| naive.and_utc())
}

/// Convert to a Windows file time.
///
/// Instants before 1601 clamp to zero and instants past the last tick
/// (year 30828) clamp to `i64::MAX`.
pub fn to_filetime(dt: &DateTime<Utc>) -> i64 {
    let ticks = dt
        .timestamp()
        .checked_add(FILETIME_UNIX_OFFSET)
        .and_then(|secs| secs.checked_mul(TICKS_PER_SECOND))
        .and_then(|ticks| ticks.checked_add(i64::from(dt.timestamp_subsec_nanos() / 100)));
    match ticks {
        Some(ticks) => ticks.max(0),
        None if dt.timestamp() < 0 => 0,
        None => i64::MAX,
    }
}

/// Convert from a Windows file time, `None` when out of chrono's range.
pub fn from_filetime(ticks: i64) -> Option<DateTime<Utc>> {
    let secs = ticks.div_euclid(TICKS_PER_SECOND) - FILETIME_UNIX_OFFSET;
    let nanos = (ticks.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}
