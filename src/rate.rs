//! Token accrual rate.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Tokens accrued per unit of wall-clock time.
///
/// Stored as tokens per second. [`Rate::UNLIMITED`] always admits and
/// [`Rate::ZERO`] never refills.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Rate {
    per_second: f64,
}

impl Rate {
    /// Always admit, regardless of burst.
    pub const UNLIMITED: Rate = Rate { per_second: f64::INFINITY };
    /// Never refill; only the burst is ever spent.
    pub const ZERO: Rate = Rate { per_second: 0.0 };

    /// `n` tokens per second.
    pub fn per_second(n: f64) -> Self {
        Self { per_second: n }
    }

    /// `n` tokens per minute.
    pub fn per_minute(n: f64) -> Self {
        Self { per_second: n / 60.0 }
    }

    pub fn as_per_second(&self) -> f64 {
        self.per_second
    }

    pub fn as_per_minute(&self) -> f64 {
        self.per_second * 60.0
    }

    pub fn is_unlimited(&self) -> bool {
        self.per_second == f64::INFINITY
    }

    pub fn is_zero(&self) -> bool {
        self.per_second == 0.0
    }

    /// Tokens accrued over `elapsed`. Zero for non-positive rates.
    pub fn tokens_for(&self, elapsed: Duration) -> f64 {
        if self.per_second <= 0.0 {
            return 0.0;
        }
        elapsed.as_secs_f64() * self.per_second
    }

    /// Time needed to accrue `tokens`, `None` when the rate never refills.
    pub fn time_for(&self, tokens: f64) -> Option<Duration> {
        if self.per_second <= 0.0 {
            return None;
        }
        if tokens <= 0.0 || self.is_unlimited() {
            return Some(Duration::ZERO);
        }
        Duration::try_from_secs_f64(tokens / self.per_second).ok()
    }
}

/// Errors from parsing a rate string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseRateError {
    #[error("invalid rate '{0}': expected a number, optionally suffixed with /s or /min, or 'inf'")]
    Malformed(String),
    #[error("invalid rate '{0}': must be non-negative")]
    Negative(String),
}

impl FromStr for Rate {
    type Err = ParseRateError;

    /// Accepts `inf`/`unlimited`, `<n>/s`, `<n>/min`, or a bare number read as
    /// tokens per minute (the unit the admin endpoint has always used).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.eq_ignore_ascii_case("inf") || raw.eq_ignore_ascii_case("unlimited") {
            return Ok(Rate::UNLIMITED);
        }
        let (number, per_second) = if let Some(n) = raw.strip_suffix("/s") {
            (n, true)
        } else if let Some(n) = raw.strip_suffix("/min") {
            (n, false)
        } else {
            (raw, false)
        };
        let value: f64 =
            number.trim().parse().map_err(|_| ParseRateError::Malformed(s.to_string()))?;
        if value.is_nan() {
            return Err(ParseRateError::Malformed(s.to_string()));
        }
        if value < 0.0 {
            return Err(ParseRateError::Negative(s.to_string()));
        }
        Ok(if per_second { Rate::per_second(value) } else { Rate::per_minute(value) })
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unlimited() {
            write!(f, "inf")
        } else {
            write!(f, "{}/min", display_per_minute(self.as_per_minute()))
        }
    }
}

/// Per-minute value rounded to nine decimals, so the per-second round trip
/// does not print as `1.9000000000000001`.
fn display_per_minute(n: f64) -> f64 {
    if n.abs() >= 1e6 {
        return n;
    }
    (n * 1e9).round() / 1e9
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_minute_converts_to_seconds() {
        let r = Rate::per_minute(120.0);
        assert_eq!(r.as_per_second(), 2.0);
        assert_eq!(r.tokens_for(Duration::from_millis(500)), 1.0);
    }

    #[test]
    fn zero_and_unlimited_are_special() {
        assert_eq!(Rate::ZERO.tokens_for(Duration::from_secs(3600)), 0.0);
        assert_eq!(Rate::ZERO.time_for(1.0), None);
        assert!(Rate::UNLIMITED.is_unlimited());
        assert_eq!(Rate::UNLIMITED.time_for(1.0), Some(Duration::ZERO));
    }

    #[test]
    fn time_for_inverts_tokens_for() {
        let r = Rate::per_second(4.0);
        assert_eq!(r.time_for(1.0), Some(Duration::from_millis(250)));
    }

    #[test]
    fn parses_suffixes_and_bare_numbers() {
        assert_eq!("10/s".parse::<Rate>().unwrap(), Rate::per_second(10.0));
        assert_eq!("30/min".parse::<Rate>().unwrap(), Rate::per_minute(30.0));
        assert_eq!("5".parse::<Rate>().unwrap(), Rate::per_minute(5.0));
        assert_eq!("INF".parse::<Rate>().unwrap(), Rate::UNLIMITED);
    }

    #[test]
    fn rejects_garbage_and_negatives() {
        assert!(matches!("fast".parse::<Rate>(), Err(ParseRateError::Malformed(_))));
        assert!(matches!("NaN".parse::<Rate>(), Err(ParseRateError::Malformed(_))));
        assert!(matches!("-1/s".parse::<Rate>(), Err(ParseRateError::Negative(_))));
    }

    #[test]
    fn display_round_trips_through_parse() {
        let r = Rate::per_minute(7.5);
        assert_eq!(r.to_string(), "7.5/min");
        assert_eq!(r.to_string().parse::<Rate>().unwrap(), r);
        assert_eq!(Rate::UNLIMITED.to_string(), "inf");
    }

    #[test]
    fn display_hides_per_second_rounding() {
        assert_eq!(Rate::per_minute(1.9).to_string(), "1.9/min");
        for tenths in 1..2000 {
            let n = f64::from(tenths) / 10.0;
            let r = Rate::per_minute(n);
            assert_eq!(r.to_string(), format!("{n}/min"));
            assert_eq!(r.to_string().parse::<Rate>().unwrap(), r);
        }
        assert_eq!(Rate::per_second(2.0).to_string(), "120/min");
    }
}
