//! Per-resource operation timeouts
//!
//! Resources may carry a `timeouts` map attribute overriding the default
//! budget of each lifecycle operation, e.g. `{"create": "90m", "delete": "1h"}`.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::ErrorKind;
use crate::resource::Value;

/// Name of the attribute holding timeout overrides
pub const ATTRIBUTE: &str = "timeouts";

/// Longest accepted timeout
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Horizon used when `now + budget` is not representable
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Absolute deadline `budget` from now
pub(crate) fn deadline_after(budget: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(budget)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Time budgets for create, update and delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Timeouts {
    pub const fn new(create: Duration, update: Duration, delete: Duration) -> Self {
        Self {
            create,
            update,
            delete,
        }
    }

    /// Apply the overrides found in `attributes` on top of `defaults`
    pub fn from_attributes(
        attributes: &HashMap<String, Value>,
        defaults: Timeouts,
    ) -> Result<Self, ErrorKind> {
        let mut timeouts = defaults;
        let overrides = match attributes.get(ATTRIBUTE) {
            None => return Ok(timeouts),
            Some(Value::Map(map)) => map,
            Some(other) => {
                return Err(ErrorKind::config(format!(
                    "'{}' must be a map, got {}",
                    ATTRIBUTE,
                    other.type_name()
                )));
            }
        };

        for (key, value) in overrides {
            let Value::String(text) = value else {
                return Err(ErrorKind::config(format!(
                    "timeout '{}' must be a duration string",
                    key
                )));
            };
            let duration = parse_duration(text)?;
            match key.as_str() {
                "create" => timeouts.create = duration,
                "update" => timeouts.update = duration,
                "delete" => timeouts.delete = duration,
                other => {
                    return Err(ErrorKind::config(format!("unknown timeout '{}'", other)));
                }
            }
        }
        Ok(timeouts)
    }
}

/// Parse a duration such as `"30s"`, `"90m"`, `"1h"` or `"1h30m"`
pub fn parse_duration(text: &str) -> Result<Duration, ErrorKind> {
    let invalid = || ErrorKind::config(format!("invalid duration '{}'", text));

    let mut total = Duration::ZERO;
    let mut digits = String::new();
    let mut saw_unit = false;

    for c in text.trim().chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: u64 = digits.parse().map_err(|_| invalid())?;
        digits.clear();
        let unit: u64 = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(invalid()),
        };
        let secs = n.checked_mul(unit).ok_or_else(invalid)?;
        total = total
            .checked_add(Duration::from_secs(secs))
            .ok_or_else(invalid)?;
        saw_unit = true;
    }

    if !digits.is_empty() || !saw_unit {
        return Err(invalid());
    }
    if total > MAX_TIMEOUT {
        return Err(ErrorKind::config(format!(
            "duration '{}' exceeds the maximum of {}h",
            text,
            MAX_TIMEOUT.as_secs() / 3600
        )));
    }
    Ok(total)
}
