//! Conversion of user-provided target counts (absolute or percentage) into
//! concrete target numbers.

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// A parsed `count` value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Count {
    Absolute(i32),
    Percent(i32),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidCount {
    #[error("count must be set")]
    Missing,

    #[error("invalid count {0:?}: expected an integer or a percentage (e.g. \"30%\")")]
    Malformed(String),

    #[error("count must be a positive integer or a valid percentage value")]
    OutOfRange,
}

impl Count {
    pub fn parse(count: &IntOrString) -> Result<Self, InvalidCount> {
        match count {
            IntOrString::Int(v) => Ok(Self::Absolute(*v)),
            IntOrString::String(s) => {
                let s = s.trim();
                if let Some(pct) = s.strip_suffix('%') {
                    return pct
                        .trim()
                        .parse()
                        .map(Self::Percent)
                        .map_err(|_| InvalidCount::Malformed(s.to_string()));
                }
                s.parse()
                    .map(Self::Absolute)
                    .map_err(|_| InvalidCount::Malformed(s.to_string()))
            }
        }
    }

    /// Scales the count against `total` eligible targets.
    ///
    /// Absolute counts are returned unchanged, whatever the size of the pool.
    pub fn scaled(self, total: usize, round_up: bool) -> i32 {
        match self {
            Self::Absolute(v) => v,
            Self::Percent(pct) => {
                let product = i64::from(pct) * total as i64;
                let scaled = if round_up {
                    product.div_euclid(100) + i64::from(product.rem_euclid(100) != 0)
                } else {
                    product.div_euclid(100)
                };
                scaled.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
            }
        }
    }
}

/// Resolves `count` into a number of targets out of `total` eligible ones.
pub fn resolve(
    count: Option<&IntOrString>,
    total: usize,
    round_up: bool,
) -> Result<i32, InvalidCount> {
    let count = Count::parse(count.ok_or(InvalidCount::Missing)?)?;
    Ok(count.scaled(total, round_up))
}

/// Admits positive integers and percentages in `(0, 100]`.
pub fn validate(count: &IntOrString) -> Result<(), InvalidCount> {
    match Count::parse(count)? {
        Count::Absolute(v) if v > 0 => Ok(()),
        Count::Percent(pct) if pct > 0 && pct <= 100 => Ok(()),
        _ => Err(InvalidCount::OutOfRange),
    }
}
