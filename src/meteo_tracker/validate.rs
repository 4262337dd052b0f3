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

use crate::cron::CronExpr;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error;
use std::fmt;

// Letters (including Hungarian accents), whitespace, hyphen, dot, apostrophe.
static TEXT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-ZáéíóöőúüűÁÉÍÓÖŐÚÜŰ\s\-.'’]+$").expect("invalid text pattern"));

#[derive(Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field '{}': {}", self.field, self.reason)
    }
}

impl error::Error for ValidationError {}

/// The closed set of validation rules applied to registration input.
///
/// Rules are selected with this enumeration rather than looked up by name,
/// so an unknown rule is unrepresentable instead of a runtime failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Value must be non-empty.
    Required,
    /// Letters (including Hungarian accents), whitespace, hyphen, dot,
    /// apostrophe.
    Text,
    /// A valid 5-field cron expression; the empty string is accepted and
    /// means "never poll".
    CronExpression,
}

impl Rule {
    pub fn check(&self, field: &'static str, value: &str) -> Result<(), ValidationError> {
        match self {
            Rule::Required => {
                if value.is_empty() {
                    return Err(ValidationError::new(field, "value is required"));
                }
            }
            Rule::Text => {
                if !TEXT_PATTERN.is_match(value) {
                    return Err(ValidationError::new(field, "contains forbidden characters"));
                }
            }
            Rule::CronExpression => {
                if !value.is_empty() {
                    if let Err(e) = CronExpr::parse(value) {
                        return Err(ValidationError::new(field, format!("not a valid cron schedule: {}", e)));
                    }
                }
            }
        }

        Ok(())
    }
}

pub fn check_all(field: &'static str, value: &str, rules: &[Rule]) -> Result<(), ValidationError> {
    for rule in rules {
        rule.check(field, value)?;
    }
    Ok(())
}

/// Latitude/longitude bounds check. Both must be finite; NaN fails every
/// comparison and is rejected by the range test.
pub fn coordinate(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    if !(value >= min && value <= max) {
        return Err(ValidationError::new(
            field,
            format!("must be between {} and {}", min, max),
        ));
    }
    Ok(())
}
