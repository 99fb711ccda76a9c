//! Maven version ordering and requested-version constraints.
//!
//! Ordering follows the Maven convention closely enough for conflict
//! resolution: numeric segments compare numerically, trailing zeros are
//! insignificant (`1.0 == 1`), and well-known qualifiers rank
//! `alpha < beta < milestone < rc < snapshot < release < sp`, with unknown
//! qualifiers sorting after `sp` lexically.

use std::cmp::Ordering;
use std::fmt;

use crate::error::UtilError;

/// A parsed, comparable version string.
#[derive(Debug, Clone)]
pub struct Version {
    original: String,
    items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Number(u64),
    Qualifier(Qualifier),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Qualifier {
    rank: u8,
    text: String,
}

const RELEASE_RANK: u8 = 6;

impl Qualifier {
    fn new(raw: &str) -> Self {
        let lower = raw.to_ascii_lowercase();
        let (rank, text) = match lower.as_str() {
            "alpha" | "a" => (1, String::new()),
            "beta" | "b" => (2, String::new()),
            "milestone" | "m" => (3, String::new()),
            "rc" | "cr" => (4, String::new()),
            "snapshot" => (5, String::new()),
            "" | "ga" | "final" | "release" => (RELEASE_RANK, String::new()),
            "sp" => (7, String::new()),
            _ => (8, lower),
        };
        Self { rank, text }
    }

    fn release() -> Self {
        Self {
            rank: RELEASE_RANK,
            text: String::new(),
        }
    }
}

impl Version {
    pub fn parse(version: &str) -> Self {
        Self {
            original: version.to_owned(),
            items: tokenize(version),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }
}

fn flush(current: &mut String, digits: bool, items: &mut Vec<Item>) {
    if current.is_empty() {
        return;
    }
    let item = if digits {
        current
            .parse::<u64>()
            .map_or_else(|_| Item::Qualifier(Qualifier::new(current)), Item::Number)
    } else {
        Item::Qualifier(Qualifier::new(current))
    };
    items.push(item);
    current.clear();
}

fn tokenize(version: &str) -> Vec<Item> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut digits = false;

    for c in version.trim().chars() {
        if c == '.' || c == '-' || c == '_' || c == '+' {
            flush(&mut current, digits, &mut items);
            continue;
        }
        let is_digit = c.is_ascii_digit();
        if !current.is_empty() && is_digit != digits {
            flush(&mut current, digits, &mut items);
        }
        digits = is_digit;
        current.push(c);
    }
    flush(&mut current, digits, &mut items);
    items
}

fn compare_items(left: Option<&Item>, right: Option<&Item>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (Some(Item::Number(l)), Some(Item::Number(r))) => l.cmp(r),
        (Some(Item::Qualifier(l)), Some(Item::Qualifier(r))) => l.cmp(r),
        (Some(Item::Number(_)), Some(Item::Qualifier(_))) => Ordering::Greater,
        (Some(Item::Qualifier(_)), Some(Item::Number(_))) => Ordering::Less,
        // A missing item pads as `0` against numbers and as "release" against qualifiers.
        (Some(Item::Number(n)), None) => n.cmp(&0),
        (None, Some(Item::Number(n))) => 0.cmp(n),
        (Some(Item::Qualifier(q)), None) => q.cmp(&Qualifier::release()),
        (None, Some(Item::Qualifier(q))) => Qualifier::release().cmp(q),
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.items.len().max(other.items.len());
        (0..len)
            .map(|i| compare_items(self.items.get(i), other.items.get(i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

/// One bound of a version range.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    version: Version,
    inclusive: bool,
}

/// A single Maven range such as `[1.0,2.0)`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Range {
    lower: Option<Bound>,
    upper: Option<Bound>,
}

impl Range {
    fn contains(&self, version: &Version) -> bool {
        let above = self.lower.as_ref().is_none_or(|b| match version.cmp(&b.version) {
            Ordering::Greater => true,
            Ordering::Equal => b.inclusive,
            Ordering::Less => false,
        });
        let below = self.upper.as_ref().is_none_or(|b| match version.cmp(&b.version) {
            Ordering::Less => true,
            Ordering::Equal => b.inclusive,
            Ordering::Greater => false,
        });
        above && below
    }
}

/// The version a dependency edge asked for.
///
/// A plain version is a *preferred* version: it accepts exactly that version
/// and nothing else, so any other selection counts as a conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// `1.2.3`
    Exact(Version),
    /// `[1.0,2.0)`, `(,1.0],[1.2,)`, `[1.5]`
    Ranges(Vec<RangeSpec>),
    /// `1.+`
    Prefix(String),
    /// `+`, `latest.release`, `latest.integration`, `RELEASE`, `LATEST`
    Latest { allow_snapshots: bool },
}

/// Opaque wrapper so `VersionConstraint` can expose ranges without exposing bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSpec(Range);

impl VersionConstraint {
    /// Parse a requested version string.
    ///
    /// # Errors
    /// Returns `UtilError::InvalidConstraint` for an empty string or a
    /// malformed range.
    pub fn parse(constraint: &str) -> Result<Self, UtilError> {
        let trimmed = constraint.trim();
        let invalid = |reason: &str| UtilError::InvalidConstraint {
            constraint: constraint.to_owned(),
            reason: reason.to_owned(),
        };

        if trimmed.is_empty() {
            return Err(invalid("empty version"));
        }
        match trimmed {
            "+" | "latest.integration" | "LATEST" => {
                return Ok(Self::Latest {
                    allow_snapshots: true,
                })
            }
            "latest.release" | "RELEASE" => {
                return Ok(Self::Latest {
                    allow_snapshots: false,
                })
            }
            _ => {}
        }
        if let Some(prefix) = trimmed.strip_suffix('+') {
            return Ok(Self::Prefix(prefix.to_owned()));
        }
        if !trimmed.starts_with('[') && !trimmed.starts_with('(') {
            return Ok(Self::Exact(Version::parse(trimmed)));
        }

        let mut ranges = Vec::new();
        let mut rest = trimmed;
        while !rest.is_empty() {
            let close = rest
                .find([']', ')'])
                .ok_or_else(|| invalid("unterminated range"))?;
            let (spec, tail) = rest.split_at(close + 1);
            ranges.push(RangeSpec(parse_range(spec).ok_or_else(|| invalid("malformed range"))?));
            rest = tail.trim_start_matches(',').trim_start();
            if !rest.is_empty() && !rest.starts_with('[') && !rest.starts_with('(') {
                return Err(invalid("expected another range after ','"));
            }
        }
        Ok(Self::Ranges(ranges))
    }

    /// Whether `version` satisfies this constraint.
    pub fn accepts(&self, version: &str) -> bool {
        let candidate = Version::parse(version);
        match self {
            Self::Exact(preferred) => *preferred == candidate,
            Self::Ranges(ranges) => ranges.iter().any(|r| r.0.contains(&candidate)),
            Self::Prefix(prefix) => version.starts_with(prefix.as_str()),
            Self::Latest { allow_snapshots } => {
                *allow_snapshots || !version.ends_with("-SNAPSHOT")
            }
        }
    }

    /// Whether the constraint needs a version listing to pick a concrete version.
    pub fn is_dynamic(&self) -> bool {
        !matches!(self, Self::Exact(_))
    }

    /// The concrete version when the constraint is a plain version.
    pub fn preferred(&self) -> Option<&str> {
        match self {
            Self::Exact(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// The highest candidate this constraint accepts.
    pub fn select<'a, I>(&self, candidates: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .filter(|c| self.accepts(c))
            .max_by(|a, b| Version::parse(a).cmp(&Version::parse(b)))
    }
}

fn parse_range(spec: &str) -> Option<Range> {
    let lower_inclusive = spec.starts_with('[');
    let upper_inclusive = spec.ends_with(']');
    let inner = spec.get(1..spec.len().checked_sub(1)?)?;

    let bound = |text: &str, inclusive: bool| {
        let text = text.trim();
        (!text.is_empty()).then(|| Bound {
            version: Version::parse(text),
            inclusive,
        })
    };

    match inner.split_once(',') {
        Some((low, high)) => Some(Range {
            lower: bound(low, lower_inclusive),
            upper: bound(high, upper_inclusive),
        }),
        // `[1.5]` pins exactly one version.
        None if lower_inclusive && upper_inclusive && !inner.trim().is_empty() => Some(Range {
            lower: bound(inner, true),
            upper: bound(inner, true),
        }),
        None => None,
    }
}
