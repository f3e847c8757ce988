use time::{Date, OffsetDateTime};

/// Source of the current time; injected so tests can pin it.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

/// Completed years between `birth` and `at`.
pub fn age_years_at(birth: Date, at: Date) -> i32 {
    let mut years = at.year() - birth.year();
    let (bm, am) = (u8::from(birth.month()), u8::from(at.month()));
    if am < bm || (am == bm && at.day() < birth.day()) {
        years -= 1;
    }
    years
}

/// Completed months between `birth` and `at`.
pub fn age_months_at(birth: Date, at: Date) -> i32 {
    let mut months = (at.year() - birth.year()) * 12
        + (i32::from(u8::from(at.month())) - i32::from(u8::from(birth.month())));
    if at.day() < birth.day() {
        months -= 1;
    }
    months
}

// `YYYY-MM-DD` (de)serialization for `Date` fields, with an `option` submodule.
time::serde::format_description!(pub iso_date, Date, "[year]-[month]-[day]");
