use crate::error::ParseTtlError;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How long a freshly computed value stays in the cache.
///
/// The variants are ordered `Zero < Finite(_) < Unlimited`, which makes
/// clamping against a ceiling a plain `min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Ttl {
  /// The value is handed to the caller but never retained.
  Zero,
  /// The value is retained and evicts itself after the given duration.
  Finite(Duration),
  /// The value is retained without an expiration timer.
  Unlimited,
}

impl Ttl {
  pub const fn from_millis(millis: u64) -> Self {
    Self::from_duration(Duration::from_millis(millis))
  }

  pub const fn from_secs(secs: u64) -> Self {
    Self::from_duration(Duration::from_secs(secs))
  }

  pub const fn from_minutes(minutes: u64) -> Self {
    Self::from_duration(Duration::from_secs(minutes.saturating_mul(60)))
  }

  pub const fn from_hours(hours: u64) -> Self {
    Self::from_duration(Duration::from_secs(hours.saturating_mul(60 * 60)))
  }

  pub const fn from_days(days: u64) -> Self {
    Self::from_duration(Duration::from_secs(days.saturating_mul(24 * 60 * 60)))
  }

  /// Wraps a duration, mapping a zero-length duration to [`Ttl::Zero`].
  pub const fn from_duration(duration: Duration) -> Self {
    if duration.is_zero() {
      Ttl::Zero
    } else {
      Ttl::Finite(duration)
    }
  }

  /// Folds `Finite(0)` into `Zero`.
  #[inline]
  pub fn normalize(self) -> Self {
    match self {
      Ttl::Finite(d) if d.is_zero() => Ttl::Zero,
      other => other,
    }
  }

  #[inline]
  pub fn is_zero(&self) -> bool {
    self.normalize() == Ttl::Zero
  }

  #[inline]
  pub fn is_unlimited(&self) -> bool {
    matches!(self, Ttl::Unlimited)
  }

  /// Returns the timer delay, if this TTL needs one.
  pub fn as_duration(&self) -> Option<Duration> {
    match self.normalize() {
      Ttl::Finite(d) => Some(d),
      _ => None,
    }
  }

  /// Caps this TTL at `max`. An `Unlimited` ceiling leaves it untouched.
  #[inline]
  pub fn clamp_to(self, max: Ttl) -> Ttl {
    self.normalize().min(max.normalize())
  }
}

impl From<Duration> for Ttl {
  fn from(duration: Duration) -> Self {
    Ttl::from_duration(duration)
  }
}

impl fmt::Display for Ttl {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.normalize() {
      Ttl::Zero => f.write_str("zero"),
      Ttl::Unlimited => f.write_str("unlimited"),
      Ttl::Finite(d) => write!(f, "{}", humantime::format_duration(d)),
    }
  }
}

const UNLIMITED_WORDS: &[&str] = &["unlimited", "infinite", "indefinite", "forever"];
const ZERO_WORDS: &[&str] = &["zero", "none", "disabled"];

impl FromStr for Ttl {
  type Err = ParseTtlError;

  /// Accepts `"unlimited"`, `"zero"` and spans such as `"3 minutes"`,
  /// `"1 day, 2 hours"`, `"42s"` or `"1h30m"`.
  fn from_str(input: &str) -> Result<Self, Self::Err> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
      return Err(ParseTtlError::Empty);
    }

    let lowered = trimmed.to_ascii_lowercase();
    if UNLIMITED_WORDS.contains(&lowered.as_str()) {
      return Ok(Ttl::Unlimited);
    }
    if ZERO_WORDS.contains(&lowered.as_str()) {
      return Ok(Ttl::Zero);
    }

    let compact = compact_spans(trimmed);
    if compact.bytes().all(|b| b.is_ascii_digit()) {
      return Err(ParseTtlError::Invalid {
        input: input.to_string(),
        reason: "missing time unit".to_string(),
      });
    }

    humantime::parse_duration(&compact)
      .map(Ttl::from_duration)
      .map_err(|e| ParseTtlError::Invalid {
        input: input.to_string(),
        reason: e.to_string(),
      })
  }
}

/// Rewrites `"1 day, 2 Hours"` into `"1day 2hours"`.
///
/// Single-letter units keep their case since `M` (months) and `m` (minutes)
/// differ.
fn compact_spans(input: &str) -> String {
  let tokens: Vec<String> = input
    .split(|c: char| c.is_whitespace() || c == ',')
    .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("and"))
    .map(|t| {
      if t.chars().count() > 1 {
        t.to_ascii_lowercase()
      } else {
        t.to_string()
      }
    })
    .collect();

  let mut out = String::with_capacity(input.len());
  let mut iter = tokens.iter().peekable();
  while let Some(token) = iter.next() {
    out.push_str(token);
    let is_number = token.bytes().all(|b| b.is_ascii_digit());
    match iter.peek() {
      Some(next) if is_number && next.starts_with(|c: char| c.is_ascii_alphabetic()) => {}
      Some(_) => out.push(' '),
      None => {}
    }
  }
  out
}

#[cfg(feature = "serde")]
impl serde::Serialize for Ttl {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Ttl {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let text = String::deserialize(deserializer)?;
    text.parse().map_err(serde::de::Error::custom)
  }
}
