//! Relative period expressions such as `3 days ago`.

use crate::error::{ExtractorError, Result};
use chrono::{DateTime, Duration, Months, NaiveDate, Utc};

/// Resolves a relative expression to the calendar date it points at, counted back from `now`.
///
/// Accepted forms: `today`, `yesterday` and `<n> <unit> [ago]` where unit is one of
/// hours, days, weeks, months or years (with their usual abbreviations).
pub fn past_date(expression: &str, now: DateTime<Utc>) -> Result<NaiveDate> {
    let invalid = || ExtractorError::InvalidRelativePeriod {
        expression: expression.to_string(),
    };

    let lowered = expression.trim().to_lowercase();
    let parts: Vec<&str> = lowered.split_whitespace().collect();

    match parts.as_slice() {
        ["today"] => return Ok(now.date_naive()),
        ["yesterday"] => return Ok((now - Duration::days(1)).date_naive()),
        _ => {}
    }

    let (amount, unit) = match parts.as_slice() {
        [amount, unit] | [amount, unit, "ago"] => (*amount, *unit),
        _ => return Err(invalid()),
    };
    let amount: u32 = amount.parse().map_err(|_| invalid())?;

    let date = match unit {
        "hour" | "hours" | "hr" | "hrs" | "h" => now - Duration::hours(i64::from(amount)),
        "day" | "days" | "d" => now - Duration::days(i64::from(amount)),
        "week" | "weeks" | "wk" | "wks" | "w" => now - Duration::weeks(i64::from(amount)),
        "month" | "months" | "mon" | "mons" | "m" => now
            .checked_sub_months(Months::new(amount))
            .ok_or_else(invalid)?,
        "year" | "years" | "yr" | "yrs" | "y" => now
            .checked_sub_months(Months::new(amount.checked_mul(12).ok_or_else(invalid)?))
            .ok_or_else(invalid)?,
        _ => return Err(invalid()),
    };

    Ok(date.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, 31, 1, 30, 0).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_named_days() {
        assert_eq!(past_date("today", now()).unwrap(), date("2023-03-31"));
        assert_eq!(past_date("Yesterday", now()).unwrap(), date("2023-03-30"));
    }

    #[test]
    fn test_units() {
        assert_eq!(past_date("3 days ago", now()).unwrap(), date("2023-03-28"));
        assert_eq!(past_date("2 hours ago", now()).unwrap(), date("2023-03-30"));
        assert_eq!(past_date("1 week", now()).unwrap(), date("2023-03-24"));
        assert_eq!(past_date("1 month ago", now()).unwrap(), date("2023-02-28"));
        assert_eq!(past_date("2 years ago", now()).unwrap(), date("2021-03-31"));
    }

    #[test]
    fn test_invalid_expressions() {
        for expression in ["", "soon", "three days ago", "3 fortnights ago", "3 days from now"] {
            assert!(
                matches!(
                    past_date(expression, now()),
                    Err(ExtractorError::InvalidRelativePeriod { .. })
                ),
                "should reject: {}",
                expression
            );
        }
    }
}
