use fieldops_domain::parse_date;
use time::util::days_in_year_month;
use time::{Date, Duration, Month};
use tracing::warn;

/// Resolve free-form follow-up text ("2026-03-01", "6 months", "next week")
/// into a concrete calendar date. Total: always returns a date, never fails.
///
/// Resolution order: an ISO date strictly after `today` wins; otherwise the
/// first matching unit keyword (month, week, year, day) scaled by the first
/// run of digits in the text; otherwise one month out.
#[must_use]
pub fn resolve_follow_up_date(raw: &str, today: Date) -> Date {
    let text = raw.trim().to_lowercase();

    // A past or ambiguous date parsed out of noisy text is worse than a
    // relative fallback, hence the strictly-after guard.
    if let Ok(parsed) = parse_date(&text) {
        if parsed > today {
            return parsed;
        }
    }

    let magnitude = first_digit_run(&text).unwrap_or(1);

    if text.contains("month") {
        return add_months(today, magnitude);
    }
    if text.contains("week") {
        return today.saturating_add(Duration::weeks(i64::from(magnitude)));
    }
    if text.contains("year") {
        return add_months(today, magnitude.saturating_mul(12));
    }
    if text.contains("day") {
        return today.saturating_add(Duration::days(i64::from(magnitude)));
    }

    warn!(input = raw, "could not parse follow-up date, defaulting to 1 month");
    add_months(today, 1)
}

fn first_digit_run(text: &str) -> Option<i32> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Calendar-aware month addition: the day of month is clamped to the length
/// of the target month (Jan 31 + 1 month = Feb 28/29).
fn add_months(date: Date, months: i32) -> Date {
    let zero_based = i32::from(u8::from(date.month())) - 1 + months;
    let year = date.year() + zero_based.div_euclid(12);
    let month = Month::January.nth_next(u8::try_from(zero_based.rem_euclid(12)).unwrap_or(0));
    let day = date.day().min(days_in_year_month(year, month));
    Date::from_calendar_date(year, month, day).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::{add_months, resolve_follow_up_date};
    use time::macros::date;
    use time::Duration;

    const TODAY: time::Date = date!(2025 - 07 - 15);

    #[test]
    fn resolution_is_idempotent_within_a_day() {
        assert_eq!(
            resolve_follow_up_date("6 months", TODAY),
            resolve_follow_up_date("6 months", TODAY)
        );
    }

    #[test]
    fn future_iso_date_is_taken_verbatim() {
        assert_eq!(
            resolve_follow_up_date("2026-03-01", TODAY),
            date!(2026 - 03 - 01)
        );
    }

    #[test]
    fn past_iso_date_falls_back_to_one_month() {
        assert_eq!(
            resolve_follow_up_date("2024-03-01", TODAY),
            date!(2025 - 08 - 15)
        );
    }

    #[test]
    fn relative_months_use_calendar_arithmetic() {
        assert_eq!(
            resolve_follow_up_date("6 months", TODAY),
            date!(2026 - 01 - 15)
        );
    }

    #[test]
    fn month_end_is_clamped() {
        assert_eq!(add_months(date!(2025 - 01 - 31), 1), date!(2025 - 02 - 28));
        assert_eq!(add_months(date!(2024 - 01 - 31), 1), date!(2024 - 02 - 29));
        assert_eq!(add_months(date!(2025 - 12 - 31), 2), date!(2026 - 02 - 28));
    }

    #[test]
    fn weeks_and_days_use_fixed_length_arithmetic() {
        assert_eq!(
            resolve_follow_up_date("2 weeks", TODAY),
            TODAY + Duration::weeks(2)
        );
        assert_eq!(
            resolve_follow_up_date("in 12 days", TODAY),
            TODAY + Duration::days(12)
        );
    }

    #[test]
    fn keyword_without_digits_defaults_to_one() {
        assert_eq!(resolve_follow_up_date("next month", TODAY), date!(2025 - 08 - 15));
        assert_eq!(
            resolve_follow_up_date("next week", TODAY),
            TODAY + Duration::weeks(1)
        );
    }

    #[test]
    fn first_digit_run_wins_over_later_numbers() {
        // "week" outranks "day", and only the first run of digits counts.
        assert_eq!(
            resolve_follow_up_date("2 weeks 3 days", TODAY),
            TODAY + Duration::weeks(2)
        );
    }

    #[test]
    fn years_resolve_through_month_arithmetic() {
        assert_eq!(
            resolve_follow_up_date("1 year", TODAY),
            date!(2026 - 07 - 15)
        );
    }

    #[test]
    fn unparseable_text_defaults_to_one_month() {
        assert_eq!(
            resolve_follow_up_date("when the heater acts up again", TODAY),
            date!(2025 - 08 - 15)
        );
    }
}
