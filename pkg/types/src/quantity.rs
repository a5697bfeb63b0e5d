use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A decimal resource quantity with milli precision.
///
/// Quantities are the values of `hard` and `used` resource maps:
/// `"500m"` is half a unit, `"2"` is two units, `"100Mi"` is 100 mebibytes.
/// Internally the value is a signed count of millis; the written suffix is
/// remembered so a quantity prints back the way it was given whenever the
/// value is still divisible by that suffix. Equality and ordering compare
/// the milli value only, so `"1"`, `"1000m"`, and `"1k"`-scaled equivalents
/// of the same amount are all equal.
#[derive(Debug, Clone, Copy)]
pub struct Quantity {
    millis: i128,
    format: Format,
}

/// Suffix family a quantity was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Milli,
    Unit,
    Kilo,
    Mega,
    Giga,
    Tera,
    Peta,
    Kibi,
    Mebi,
    Gibi,
    Tebi,
    Pebi,
}

impl Format {
    /// Millis in one unit of this suffix.
    fn millis_per_unit(self) -> i128 {
        const KI: i128 = 1024;
        match self {
            Format::Milli => 1,
            Format::Unit => 1_000,
            Format::Kilo => 1_000_000,
            Format::Mega => 1_000_000_000,
            Format::Giga => 1_000_000_000_000,
            Format::Tera => 1_000_000_000_000_000,
            Format::Peta => 1_000_000_000_000_000_000,
            Format::Kibi => KI * 1_000,
            Format::Mebi => KI * KI * 1_000,
            Format::Gibi => KI * KI * KI * 1_000,
            Format::Tebi => KI * KI * KI * KI * 1_000,
            Format::Pebi => KI * KI * KI * KI * KI * 1_000,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Format::Milli => "m",
            Format::Unit => "",
            Format::Kilo => "k",
            Format::Mega => "M",
            Format::Giga => "G",
            Format::Tera => "T",
            Format::Peta => "P",
            Format::Kibi => "Ki",
            Format::Mebi => "Mi",
            Format::Gibi => "Gi",
            Format::Tebi => "Ti",
            Format::Pebi => "Pi",
        }
    }

    fn from_suffix(s: &str) -> Option<Format> {
        match s {
            "m" => Some(Format::Milli),
            "" => Some(Format::Unit),
            "k" => Some(Format::Kilo),
            "M" => Some(Format::Mega),
            "G" => Some(Format::Giga),
            "T" => Some(Format::Tera),
            "P" => Some(Format::Peta),
            "Ki" => Some(Format::Kibi),
            "Mi" => Some(Format::Mebi),
            "Gi" => Some(Format::Gibi),
            "Ti" => Some(Format::Tebi),
            "Pi" => Some(Format::Pebi),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,
    #[error("invalid quantity {0:?}")]
    Invalid(String),
    #[error("unknown quantity suffix in {0:?}")]
    UnknownSuffix(String),
    #[error("quantity {0:?} is finer than milli precision")]
    TooPrecise(String),
    #[error("quantity {0:?} overflows the internal representation")]
    Overflow(String),
}

impl Quantity {
    pub fn zero() -> Quantity {
        Quantity {
            millis: 0,
            format: Format::Unit,
        }
    }

    /// Build a quantity from a raw milli count.
    pub fn from_millis(millis: i128) -> Quantity {
        let format = if millis % 1_000 == 0 {
            Format::Unit
        } else {
            Format::Milli
        };
        Quantity { millis, format }
    }

    pub fn millis(&self) -> i128 {
        self.millis
    }

    pub fn is_zero(&self) -> bool {
        self.millis == 0
    }

    pub fn is_negative(&self) -> bool {
        self.millis < 0
    }

    /// Value in whole units as a float, for metrics exposition.
    pub fn to_f64(&self) -> f64 {
        self.millis as f64 / 1000.0
    }

    /// Sum keeping this quantity's written format.
    pub fn saturating_add(self, rhs: Quantity) -> Quantity {
        Quantity {
            millis: self.millis.saturating_add(rhs.millis),
            format: self.format,
        }
    }

    /// Difference keeping this quantity's written format.
    pub fn saturating_sub(self, rhs: Quantity) -> Quantity {
        Quantity {
            millis: self.millis.saturating_sub(rhs.millis),
            format: self.format,
        }
    }

    pub fn checked_add(self, rhs: Quantity) -> Option<Quantity> {
        Some(Quantity {
            millis: self.millis.checked_add(rhs.millis)?,
            format: self.format,
        })
    }

    pub fn checked_sub(self, rhs: Quantity) -> Option<Quantity> {
        Some(Quantity {
            millis: self.millis.checked_sub(rhs.millis)?,
            format: self.format,
        })
    }
}

impl Default for Quantity {
    fn default() -> Quantity {
        Quantity::zero()
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Quantity) -> bool {
        self.millis == other.millis
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Quantity) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Quantity) -> Ordering {
        self.millis.cmp(&other.millis)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.millis == 0 {
            return write!(f, "0");
        }
        let scale = self.format.millis_per_unit();
        if self.millis % scale == 0 {
            return write!(f, "{}{}", self.millis / scale, self.format.suffix());
        }
        // Value no longer divisible by the written suffix: fall back to
        // whole units, then to millis.
        if self.millis % 1_000 == 0 {
            write!(f, "{}", self.millis / 1_000)
        } else {
            write!(f, "{}m", self.millis)
        }
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    /// Parse `[sign] digits [ "." digits ] [suffix]`.
    ///
    /// Suffixes: `m` (milli), none (units), decimal `k M G T P`, and
    /// binary `Ki Mi Gi Ti Pi`. Scientific notation is not accepted, and
    /// neither is anything finer than one milli (for example `"1.5m"`).
    fn from_str(s: &str) -> Result<Quantity, QuantityError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };

        let number_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        let (number, suffix) = rest.split_at(number_end);
        if number.is_empty() {
            return Err(QuantityError::Invalid(s.into()));
        }

        let format =
            Format::from_suffix(suffix).ok_or_else(|| QuantityError::UnknownSuffix(s.into()))?;

        let (int_part, frac_part) = match number.split_once('.') {
            Some((i, fr)) => (i, fr),
            None => (number, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(QuantityError::Invalid(s.into()));
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(QuantityError::Invalid(s.into()));
        }

        let scale = format.millis_per_unit();
        let overflow = || QuantityError::Overflow(s.into());

        let int_value: i128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| overflow())?
        };
        let mut millis = int_value.checked_mul(scale).ok_or_else(overflow)?;

        if !frac_part.is_empty() {
            let frac_value: i128 = frac_part.parse().map_err(|_| overflow())?;
            let frac_scale = 10i128
                .checked_pow(frac_part.len() as u32)
                .ok_or_else(overflow)?;
            let contribution = frac_value.checked_mul(scale).ok_or_else(overflow)?;
            if contribution % frac_scale != 0 {
                return Err(QuantityError::TooPrecise(s.into()));
            }
            millis = millis
                .checked_add(contribution / frac_scale)
                .ok_or_else(overflow)?;
        }

        if negative {
            millis = -millis;
        }
        Ok(Quantity { millis, format })
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Quantity, D::Error> {
        deserializer.deserialize_any(QuantityVisitor)
    }
}

struct QuantityVisitor;

impl Visitor<'_> for QuantityVisitor {
    type Value = Quantity;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a quantity string like \"500m\" or an integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Quantity, E> {
        v.parse().map_err(de::Error::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Quantity, E> {
        Ok(Quantity::from_millis(v as i128 * 1_000))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Quantity, E> {
        Ok(Quantity::from_millis(v as i128 * 1_000))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Quantity, E> {
        let millis = v * 1000.0;
        if !millis.is_finite() || millis.fract() != 0.0 || millis.abs() >= i64::MAX as f64 {
            return Err(de::Error::custom(format!(
                "quantity {v} is finer than milli precision"
            )));
        }
        Ok(Quantity::from_millis(millis as i128))
    }
}
