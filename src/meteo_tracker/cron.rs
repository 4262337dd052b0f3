// meteo_tracker - City weather tracker and Prometheus exporter for Open-Meteo
//
// Copyright 2025 meteo_tracker contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use std::error;
use std::fmt;

#[derive(Debug, PartialEq, Eq)]
pub enum CronParseError {
    FieldCount(usize),
    BadToken(&'static str, String),
    OutOfRange(&'static str, u32),
}

impl fmt::Display for CronParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldCount(n) => write!(f, "expected 5 cron fields, got {}", n),
            Self::BadToken(field, tok) => write!(f, "invalid token '{}' in {} field", tok, field),
            Self::OutOfRange(field, val) => write!(f, "value {} out of range for {} field", val, field),
        }
    }
}

impl error::Error for CronParseError {}

/// One parsed cron field, represented as a bitmask over the allowed values.
///
/// `restricted` records whether the field was written as anything other than
/// a bare `*`. This distinction only matters for the day-of-month/day-of-week
/// combination rule, see `CronExpr::matches`.
#[derive(Debug, Clone, Copy)]
struct CronField {
    allowed: u64,
    restricted: bool,
}

impl CronField {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.allowed & (1 << value) != 0
    }
}

/// A standard 5-field cron expression: minute, hour, day-of-month, month,
/// day-of-week.
///
/// Each field supports `*`, explicit integers, comma lists, ranges (`a-b`)
/// and step values (`*/n`, `a-b/n`, or `a/n` which steps from `a` to the
/// field maximum). Day-of-week runs 0-7 where both 0 and 7 mean Sunday.
/// Month and day names are not accepted.
#[derive(Debug, Clone)]
pub struct CronExpr {
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

impl CronExpr {
    pub fn parse(expression: &str) -> Result<Self, CronParseError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronParseError::FieldCount(fields.len()));
        }

        Ok(CronExpr {
            minute: parse_field("minute", fields[0], 0, 59)?,
            hour: parse_field("hour", fields[1], 0, 23)?,
            day_of_month: parse_field("day-of-month", fields[2], 1, 31)?,
            month: parse_field("month", fields[3], 1, 12)?,
            day_of_week: parse_field("day-of-week", fields[4], 0, 7)?,
        })
    }

    /// Whether this schedule is due at the given timestamp.
    ///
    /// All fields are evaluated at minute resolution. The day fields follow
    /// the classic Vixie cron rule: when both day-of-month and day-of-week
    /// are restricted (written as anything other than `*`), the day matches
    /// when either of them matches; otherwise both must match, with an
    /// unrestricted field matching every day.
    pub fn matches<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        let dom = self.day_of_month.contains(at.day());
        let dow = self.day_of_week.contains(at.weekday().num_days_from_sunday());

        let day = if self.day_of_month.restricted && self.day_of_week.restricted {
            dom || dow
        } else {
            dom && dow
        };

        self.minute.contains(at.minute()) && self.hour.contains(at.hour()) && self.month.contains(at.month()) && day
    }
}

/// Fail-closed due check: an expression that does not parse is never due.
///
/// The parse failure is logged at warning level so a misconfigured schedule
/// is visible without aborting the caller.
pub fn is_due<Tz: TimeZone>(expression: &str, at: &DateTime<Tz>) -> bool {
    match CronExpr::parse(expression) {
        Ok(expr) => expr.matches(at),
        Err(e) => {
            tracing::warn!(message = "unparseable cron expression, treating as not due", expression = %expression, error = %e);
            false
        }
    }
}

fn parse_field(name: &'static str, text: &str, min: u32, max: u32) -> Result<CronField, CronParseError> {
    if text == "*" {
        return Ok(CronField {
            allowed: mask(min, max, 1),
            restricted: false,
        });
    }

    let mut allowed = 0u64;
    for part in text.split(',') {
        let (base, step) = match part.split_once('/') {
            Some((base, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| CronParseError::BadToken(name, part.to_owned()))?;
                // A step of zero never advances and one beyond the field
                // maximum can never select a second value.
                if step == 0 || step > max {
                    return Err(CronParseError::BadToken(name, part.to_owned()));
                }
                (base, step)
            }
            None => (part, 1),
        };

        let (lo, hi) = if base == "*" {
            (min, max)
        } else if let Some((lo, hi)) = base.split_once('-') {
            let lo = parse_value(name, lo, min, max)?;
            let hi = parse_value(name, hi, min, max)?;
            if lo > hi {
                return Err(CronParseError::BadToken(name, part.to_owned()));
            }
            (lo, hi)
        } else {
            let value = parse_value(name, base, min, max)?;
            // A bare value with a step ("3/5") runs from the value to the
            // field maximum, matching Vixie cron.
            if step > 1 {
                (value, max)
            } else {
                (value, value)
            }
        };

        allowed |= mask(lo, hi, step);
    }

    // Day-of-week 7 is an alias for Sunday.
    if max == 7 && allowed & (1 << 7) != 0 {
        allowed |= 1;
    }

    Ok(CronField {
        allowed,
        restricted: true,
    })
}

fn parse_value(name: &'static str, text: &str, min: u32, max: u32) -> Result<u32, CronParseError> {
    let value: u32 = text
        .parse()
        .map_err(|_| CronParseError::BadToken(name, text.to_owned()))?;
    if value < min || value > max {
        return Err(CronParseError::OutOfRange(name, value));
    }
    Ok(value)
}

fn mask(lo: u32, hi: u32, step: u32) -> u64 {
    let mut bits = 0u64;
    let mut v = lo;
    while v <= hi {
        bits |= 1 << v;
        v += step;
    }
    bits
}
