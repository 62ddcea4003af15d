//! Timing specification grammar (`spec.md` §3, §4.C).
//!
//! A `TimingSpec` is parsed once from the closed-grammar string carried on a
//! `call_template`, then resolved against a discharge instant into one or
//! more concrete UTC firing times. Resolution never fails: an unparseable
//! spec silently becomes the documented fallback (24h after discharge) with
//! a warning logged, so a typo in a discharge order never blocks scheduling
//! the rest of the patient's calls.

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimingSpec {
    HoursAfterDischarge(i64),
    DailyForDaysStartingHoursAfter { days: i64, start_hours: i64 },
    DayBeforeDate(NaiveDate),
    Within24Hours,
    /// Unrecognized grammar; resolves the same as 24h after discharge.
    Fallback,
}

impl TimingSpec {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();

        if raw == "within_24_hours" {
            return TimingSpec::Within24Hours;
        }

        if let Some(rest) = raw.strip_prefix("day_before_date:") {
            if let Ok(date) = NaiveDate::parse_from_str(rest, "%Y-%m-%d") {
                return TimingSpec::DayBeforeDate(date);
            }
            log::warn!("timing spec {raw:?} has an unparseable date, falling back to 24h");
            return TimingSpec::Fallback;
        }

        if let Some(rest) = raw.strip_prefix("daily_for_") {
            // daily_for_N_days_starting_M_hours_after_discharge
            if let Some((days_part, tail)) = rest.split_once("_days_starting_") {
                if let Some(hours_part) = tail.strip_suffix("_hours_after_discharge") {
                    if let (Ok(days), Ok(start_hours)) =
                        (days_part.parse::<i64>(), hours_part.parse::<i64>())
                    {
                        return TimingSpec::DailyForDaysStartingHoursAfter { days, start_hours };
                    }
                }
            }
            log::warn!("timing spec {raw:?} doesn't match the daily_for_ grammar, falling back to 24h");
            return TimingSpec::Fallback;
        }

        if let Some(hours_part) = raw.strip_suffix("_hours_after_discharge") {
            if let Ok(hours) = hours_part.parse::<i64>() {
                return TimingSpec::HoursAfterDischarge(hours);
            }
        }

        log::warn!("unrecognized timing spec {raw:?}, falling back to 24h after discharge");
        TimingSpec::Fallback
    }

    /// Resolve this spec into one or more concrete UTC instants relative to
    /// `discharge`. `daily_for_N_days` produces `N` instants, everything
    /// else produces exactly one.
    pub fn instants(&self, discharge: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        match self {
            TimingSpec::HoursAfterDischarge(hours) => vec![discharge + Duration::hours(*hours)],
            TimingSpec::Within24Hours => vec![discharge + Duration::hours(18)],
            TimingSpec::Fallback => vec![discharge + Duration::hours(24)],
            TimingSpec::DailyForDaysStartingHoursAfter { days, start_hours } => (0..*days)
                .map(|n| discharge + Duration::hours(*start_hours) + Duration::days(n))
                .collect(),
            TimingSpec::DayBeforeDate(date) => {
                let prior_day = *date - Duration::days(1);
                let local_14_00 = prior_day.and_hms_opt(14, 0, 0).expect("valid time");
                let local_dt = Local
                    .from_local_datetime(&local_14_00)
                    .single()
                    .unwrap_or_else(|| Local.from_utc_datetime(&local_14_00));
                vec![local_dt.with_timezone(&Utc)]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn discharge() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 15, 30, 0).unwrap()
    }

    #[test]
    fn hours_after_discharge() {
        let spec = TimingSpec::parse("24_hours_after_discharge");
        assert_eq!(spec, TimingSpec::HoursAfterDischarge(24));
        let instants = spec.instants(discharge());
        assert_eq!(instants, vec![Utc.with_ymd_and_hms(2025, 1, 16, 15, 30, 0).unwrap()]);
    }

    #[test]
    fn within_24_hours_means_18h() {
        let spec = TimingSpec::parse("within_24_hours");
        assert_eq!(spec.instants(discharge()), vec![discharge() + Duration::hours(18)]);
    }

    #[test]
    fn daily_for_n_days_produces_n_instants() {
        let spec = TimingSpec::parse("daily_for_3_days_starting_8_hours_after_discharge");
        let instants = spec.instants(discharge());
        assert_eq!(instants.len(), 3);
        assert_eq!(instants[0], discharge() + Duration::hours(8));
        assert_eq!(instants[1], discharge() + Duration::hours(8) + Duration::days(1));
        assert_eq!(instants[2], discharge() + Duration::hours(8) + Duration::days(2));
    }

    #[test]
    fn day_before_date_fires_at_local_1400_prior_day() {
        let spec = TimingSpec::parse("day_before_date:2025-06-23");
        match spec {
            TimingSpec::DayBeforeDate(d) => assert_eq!(d, NaiveDate::from_ymd_opt(2025, 6, 23).unwrap()),
            other => panic!("unexpected parse: {other:?}"),
        }
        let instants = spec.instants(discharge());
        assert_eq!(instants.len(), 1);
    }

    #[test]
    fn unknown_grammar_falls_back_to_24h() {
        let spec = TimingSpec::parse("whenever_feels_right");
        assert_eq!(spec, TimingSpec::Fallback);
        assert_eq!(spec.instants(discharge()), vec![discharge() + Duration::hours(24)]);
    }
}
