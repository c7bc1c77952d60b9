use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::Result;

/// The normalized rendering of every timestamp the index stores.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATE_FORMATS: &[&str] = &[
    "%d/%m/%Y", "%d.%m.%Y", "%d-%m-%Y",
    "%Y/%m/%d", "%Y.%m.%d", "%Y-%m-%d",
];

const TIME_SUFFIXES: &[&str] = &[" %H:%M", " %H:%M:%S", " %H:%M:%S%.f"];

/// Parses `string` as one of the supported day-first or year-first date
/// forms, optionally followed by a time of day.
pub fn guess_datetime(string: &str) -> Option<NaiveDateTime> {
    let string = string.trim();
    for date in DATE_FORMATS {
        if let Ok(day) = NaiveDate::parse_from_str(string, date) {
            return day.and_hms_opt(0, 0, 0);
        }

        for time in TIME_SUFFIXES {
            let format = format!("{date}{time}");
            if let Ok(datetime) = NaiveDateTime::parse_from_str(string, &format) {
                return Some(datetime);
            }
        }
    }

    None
}

pub fn format_timestamp(datetime: &NaiveDateTime) -> String {
    datetime.format(TIMESTAMP_FORMAT).to_string()
}

/// `string` in [`TIMESTAMP_FORMAT`] if it parses as a date.
pub fn normalize(string: &str) -> Option<String> {
    guess_datetime(string).map(|dt| format_timestamp(&dt))
}

/// The current time, in UTC.
pub fn now() -> NaiveDateTime {
    DateTime::<Utc>::from(std::time::SystemTime::now()).naive_utc()
}

/// The last modification time of `path`, in UTC.
pub fn file_timestamp(path: &Path) -> Result<NaiveDateTime> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified).naive_utc())
}

#[cfg(test)]
mod datetime_tests {
    use super::*;

    #[test]
    fn guesses_supported_forms() {
        let expected = "2023-04-05 00:00:00";
        for input in ["05/04/2023", "05.04.2023", "05-04-2023", "2023/04/05", "2023.04.05", "2023-04-05"] {
            assert_eq!(normalize(input).as_deref(), Some(expected), "{input}");
        }

        assert_eq!(normalize("2023-04-05 10:30").as_deref(), Some("2023-04-05 10:30:00"));
        assert_eq!(normalize(" 05/04/2023 10:30:15 ").as_deref(), Some("2023-04-05 10:30:15"));
        assert_eq!(normalize("2023-04-05 10:30:15.250").as_deref(), Some("2023-04-05 10:30:15"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(guess_datetime("").is_none());
        assert!(guess_datetime("yesterday").is_none());
        assert!(guess_datetime("2023-13-45").is_none());
    }

    #[test]
    fn reads_file_mtime() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.adoc");
        std::fs::write(&path, "= A").unwrap();
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(86_400, 0)).unwrap();
        assert_eq!(format_timestamp(&file_timestamp(&path).unwrap()), "1970-01-02 00:00:00");
    }
}
