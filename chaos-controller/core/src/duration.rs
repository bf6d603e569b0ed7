use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

const NANOS_PER_MICRO: u64 = 1_000;
const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A signed duration written in Go's `time.Duration` string format (e.g. `90s`,
/// `1h30m`, `-30m`).
///
/// Disruption durations, trigger offsets and clock-skew offsets are all
/// expressed this way. The value is stored as whole nanoseconds, so the
/// representable range matches Go's (roughly ±292 years).
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DisruptionDuration {
    nanos: i64,
}

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("empty duration")]
    Empty,

    #[error("missing unit in duration {0:?}")]
    NoUnit(String),

    #[error("unknown unit {unit:?} in duration {input:?}")]
    InvalidUnit { unit: String, input: String },

    #[error("invalid number in duration {0:?}")]
    NotANumber(String),

    #[error("duration {0:?} overflows")]
    Overflow(String),
}

impl DisruptionDuration {
    pub const ZERO: Self = Self { nanos: 0 };

    pub const fn from_nanos(nanos: i64) -> Self {
        Self { nanos }
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self {
            nanos: millis * NANOS_PER_MILLI as i64,
        }
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self {
            nanos: secs * NANOS_PER_SEC as i64,
        }
    }

    pub const fn from_mins(mins: i64) -> Self {
        Self::from_secs(mins * 60)
    }

    pub const fn from_hours(hours: i64) -> Self {
        Self::from_secs(hours * 3600)
    }

    #[inline]
    pub const fn as_nanos(&self) -> i64 {
        self.nanos
    }

    #[inline]
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    #[inline]
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.nanos < 0
    }

    /// Converts to a `chrono` delta, suitable for timestamp arithmetic.
    pub fn to_delta(self) -> chrono::Duration {
        chrono::Duration::nanoseconds(self.nanos)
    }

    /// Converts to an unsigned std duration. Negative durations have no std
    /// equivalent.
    pub fn to_std(self) -> Option<std::time::Duration> {
        u64::try_from(self.nanos)
            .ok()
            .map(std::time::Duration::from_nanos)
    }
}

impl From<std::time::Duration> for DisruptionDuration {
    fn from(d: std::time::Duration) -> Self {
        Self {
            nanos: i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        }
    }
}

impl fmt::Debug for DisruptionDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Formats like Go's `Duration.String()`: `0s`, `1.5ms`, `2m0s`, `1h30m0s`.
impl fmt::Display for DisruptionDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nanos == 0 {
            return f.write_str("0s");
        }
        if self.nanos < 0 {
            f.write_str("-")?;
        }

        let n = self.nanos.unsigned_abs();
        if n < NANOS_PER_MICRO {
            return write!(f, "{n}ns");
        }
        if n < NANOS_PER_MILLI {
            write_fraction(f, n, NANOS_PER_MICRO)?;
            return f.write_str("\u{00b5}s");
        }
        if n < NANOS_PER_SEC {
            write_fraction(f, n, NANOS_PER_MILLI)?;
            return f.write_str("ms");
        }

        let secs = n / NANOS_PER_SEC;
        let (hours, mins) = (secs / 3600, (secs / 60) % 60);
        if hours > 0 {
            write!(f, "{hours}h")?;
        }
        if hours > 0 || mins > 0 {
            write!(f, "{mins}m")?;
        }
        write_fraction(f, (secs % 60) * NANOS_PER_SEC + n % NANOS_PER_SEC, NANOS_PER_SEC)?;
        f.write_str("s")
    }
}

fn write_fraction(f: &mut fmt::Formatter<'_>, value: u64, unit: u64) -> fmt::Result {
    let (whole, rem) = (value / unit, value % unit);
    write!(f, "{whole}")?;
    if rem != 0 {
        let width = unit.ilog10() as usize;
        let digits = format!("{rem:0width$}");
        write!(f, ".{}", digits.trim_end_matches('0'))?;
    }
    Ok(())
}

impl FromStr for DisruptionDuration {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut s = input;
        let negative = s.starts_with('-');
        s = s.strip_prefix(['-', '+']).unwrap_or(s);

        if s == "0" {
            return Ok(Self::ZERO);
        }
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        let overflow = || ParseError::Overflow(input.to_string());
        let mut total: u128 = 0;
        while !s.is_empty() {
            let int_end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
            let (int, rest) = s.split_at(int_end);
            let (frac, rest) = match rest.strip_prefix('.') {
                Some(rest) => {
                    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
                    rest.split_at(end)
                }
                None => ("", rest),
            };
            if int.is_empty() && frac.is_empty() {
                return Err(ParseError::NotANumber(input.to_string()));
            }

            let unit_end = rest
                .find(|c: char| c.is_ascii_digit() || c == '.')
                .unwrap_or(rest.len());
            let (unit, rest) = rest.split_at(unit_end);
            if unit.is_empty() {
                return Err(ParseError::NoUnit(input.to_string()));
            }
            let scale = unit_nanos(unit).ok_or_else(|| ParseError::InvalidUnit {
                unit: unit.to_string(),
                input: input.to_string(),
            })? as u128;

            let whole = if int.is_empty() {
                0
            } else {
                int.parse::<u128>().map_err(|_| overflow())?
            };
            total = whole
                .checked_mul(scale)
                .and_then(|v| total.checked_add(v))
                .ok_or_else(overflow)?;

            // Keep at most 18 fractional digits; anything beyond is below
            // nanosecond resolution for every unit.
            let frac = &frac[..frac.len().min(18)];
            if !frac.is_empty() {
                let digits = frac.parse::<u128>().map_err(|_| overflow())?;
                let pow = 10u128.pow(frac.len() as u32);
                total += (digits * scale + pow / 2) / pow;
            }

            s = rest;
        }

        let nanos = i64::try_from(total).map_err(|_| overflow())?;
        Ok(Self {
            nanos: if negative { -nanos } else { nanos },
        })
    }
}

fn unit_nanos(unit: &str) -> Option<u64> {
    match unit {
        "ns" => Some(1),
        // U+00B5 is the micro sign, U+03BC the Greek letter mu.
        "us" | "\u{00b5}s" | "\u{03bc}s" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3600 * NANOS_PER_SEC),
        _ => None,
    }
}

impl Serialize for DisruptionDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DisruptionDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;
        impl de::Visitor<'_> for Visitor {
            type Value = DisruptionDuration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string in Go `time.Duration` format")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                value.parse().map_err(de::Error::custom)
            }
        }
        deserializer.deserialize_str(Visitor)
    }
}

impl schemars::JsonSchema for DisruptionDuration {
    fn schema_name() -> String {
        "DisruptionDuration".to_owned()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        schemars::schema::SchemaObject {
            instance_type: Some(schemars::schema::InstanceType::String.into()),
            ..Default::default()
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_go_durations() {
        let cases: &[(&str, DisruptionDuration)] = &[
            ("0", DisruptionDuration::ZERO),
            ("-0", DisruptionDuration::ZERO),
            ("5s", DisruptionDuration::from_secs(5)),
            ("+5s", DisruptionDuration::from_secs(5)),
            ("-5s", DisruptionDuration::from_secs(-5)),
            ("5.6s", DisruptionDuration::from_millis(5600)),
            ("5.s", DisruptionDuration::from_secs(5)),
            (".5s", DisruptionDuration::from_millis(500)),
            ("1.004s", DisruptionDuration::from_millis(1004)),
            ("10ns", DisruptionDuration::from_nanos(10)),
            ("11us", DisruptionDuration::from_nanos(11_000)),
            ("12\u{00b5}s", DisruptionDuration::from_nanos(12_000)),
            ("12\u{03bc}s", DisruptionDuration::from_nanos(12_000)),
            ("13ms", DisruptionDuration::from_millis(13)),
            ("15m", DisruptionDuration::from_mins(15)),
            ("16h", DisruptionDuration::from_hours(16)),
            (
                "3h30m",
                DisruptionDuration::from_mins(3 * 60 + 30),
            ),
            (
                "-2m3.4s",
                DisruptionDuration::from_millis(-(2 * 60_000 + 3_400)),
            ),
            ("0.3333333333333333333h", DisruptionDuration::from_mins(20)),
            (
                "9007199254740993ns",
                DisruptionDuration::from_nanos((1 << 53) + 1),
            ),
        ];

        for (input, expected) in cases {
            assert_eq!(
                input.parse::<DisruptionDuration>().as_ref(),
                Ok(expected),
                "{input}"
            );
        }
    }

    #[test]
    fn rejects_malformed_durations() {
        for input in ["", "-", "3", "s", ".s", "3x", "1.5.5s"] {
            assert!(
                input.parse::<DisruptionDuration>().is_err(),
                "{input:?} must not parse"
            );
        }
        assert!(matches!(
            "9999999999h".parse::<DisruptionDuration>(),
            Err(ParseError::Overflow(_))
        ));
    }

    #[test]
    fn formats_like_go() {
        let cases = [
            (DisruptionDuration::ZERO, "0s"),
            (DisruptionDuration::from_nanos(999), "999ns"),
            (DisruptionDuration::from_nanos(1_500), "1.5\u{00b5}s"),
            (DisruptionDuration::from_millis(300), "300ms"),
            (DisruptionDuration::from_secs(90), "1m30s"),
            (DisruptionDuration::from_hours(1), "1h0m0s"),
            (DisruptionDuration::from_millis(-1_500), "-1.5s"),
        ];
        for (duration, expected) in cases {
            assert_eq!(duration.to_string(), expected);
            assert_eq!(expected.parse::<DisruptionDuration>(), Ok(duration));
        }
    }

    #[test]
    fn negative_durations_have_no_std_equivalent() {
        assert_eq!(DisruptionDuration::from_secs(-1).to_std(), None);
        assert_eq!(
            DisruptionDuration::from_secs(2).to_std(),
            Some(std::time::Duration::from_secs(2))
        );
    }
}
