//! Sort keys and the header-toggle policy.
//!
//! A [`SortSpec`] is an ordered list of `(field, direction)` keys; the first
//! key is the primary sort. Each field appears at most once.
//!
//! In URL text a key is written as the field name with a direction prefix:
//! - `name`   ascending (nulls last)
//! - `-name`  descending (nulls first)
//! - `++name` ascending, nulls first
//! - `--name` descending, nulls last

use serde::{Deserialize, Serialize};

/// Sort direction, including null placement for the two non-default variants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
    AscNullsFirst,
    DescNullsLast,
}

/// Where NULL values land in an ordering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NullsOrder {
    First,
    Last,
}

impl SortDirection {
    /// The reverse direction, keeping the "explicit nulls" flavour.
    pub fn opposite(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
            SortDirection::AscNullsFirst => SortDirection::DescNullsLast,
            SortDirection::DescNullsLast => SortDirection::AscNullsFirst,
        }
    }

    pub fn is_descending(self) -> bool {
        matches!(self, SortDirection::Desc | SortDirection::DescNullsLast)
    }

    pub fn nulls(self) -> NullsOrder {
        match self {
            SortDirection::Asc | SortDirection::DescNullsLast => NullsOrder::Last,
            SortDirection::Desc | SortDirection::AscNullsFirst => NullsOrder::First,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            SortDirection::Asc => "",
            SortDirection::Desc => "-",
            SortDirection::AscNullsFirst => "++",
            SortDirection::DescNullsLast => "--",
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Desc)
    }

    /// Parse one URL sort token. Returns `None` for a token with no field.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        let (direction, field) = if let Some(rest) = token.strip_prefix("++") {
            (SortDirection::AscNullsFirst, rest)
        } else if let Some(rest) = token.strip_prefix("--") {
            (SortDirection::DescNullsLast, rest)
        } else if let Some(rest) = token.strip_prefix('-') {
            (SortDirection::Desc, rest)
        } else if let Some(rest) = token.strip_prefix('+') {
            (SortDirection::Asc, rest)
        } else {
            (SortDirection::Asc, token)
        };

        let field = field.trim();
        if field.is_empty() || field.starts_with(['+', '-']) {
            return None;
        }
        Some(Self::new(field, direction))
    }

    pub fn encode(&self) -> String {
        format!("{}{}", self.direction.prefix(), self.field)
    }
}

/// Ordered sort keys; a field appears at most once.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SortSpec(Vec<SortKey>);

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from keys, keeping the first occurrence of a repeated field.
    pub fn from_keys(keys: impl IntoIterator<Item = SortKey>) -> Self {
        let mut spec = Self::new();
        for key in keys {
            spec.push(key);
        }
        spec
    }

    /// Parse a comma-joined sort string. Blank and malformed tokens are skipped.
    pub fn parse(text: &str) -> Self {
        Self::from_keys(text.split(',').filter_map(SortKey::parse))
    }

    /// Comma-joined URL form; empty string for an empty spec.
    pub fn encode(&self) -> String {
        self.0
            .iter()
            .map(SortKey::encode)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &SortKey> {
        self.0.iter()
    }

    pub fn direction_of(&self, field: &str) -> Option<SortDirection> {
        self.0
            .iter()
            .find(|k| k.field == field)
            .map(|k| k.direction)
    }

    /// Append a key. Returns `false` (and changes nothing) if the field is
    /// already present.
    pub fn push(&mut self, key: SortKey) -> bool {
        if self.direction_of(&key.field).is_some() {
            return false;
        }
        self.0.push(key);
        true
    }

    /// Set a field's direction in place, append it, or remove it (`None`).
    pub fn set(&mut self, field: &str, direction: Option<SortDirection>) {
        match direction {
            Some(direction) => {
                if let Some(key) = self.0.iter_mut().find(|k| k.field == field) {
                    key.direction = direction;
                } else {
                    self.0.push(SortKey::new(field, direction));
                }
            }
            None => self.0.retain(|k| k.field != field),
        }
    }

    /// Keep only keys whose field satisfies `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.0.retain(|k| keep(&k.field));
    }
}

impl FromIterator<SortKey> for SortSpec {
    fn from_iter<I: IntoIterator<Item = SortKey>>(iter: I) -> Self {
        Self::from_keys(iter)
    }
}

/// The ordered states a header toggle walks through. `None` means unsorted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SortCycle(Vec<Option<SortDirection>>);

impl Default for SortCycle {
    /// none → ascending → descending → none
    fn default() -> Self {
        Self(vec![
            None,
            Some(SortDirection::Asc),
            Some(SortDirection::Desc),
        ])
    }
}

impl SortCycle {
    pub fn new(states: Vec<Option<SortDirection>>) -> Self {
        Self(states)
    }

    pub fn states(&self) -> &[Option<SortDirection>] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// State following `current`. A state the cycle does not contain restarts
    /// the cycle at its first entry.
    pub fn next(&self, current: Option<SortDirection>) -> Option<SortDirection> {
        if self.0.is_empty() {
            return None;
        }
        match self.0.iter().position(|s| *s == current) {
            Some(pos) => self.0[(pos + 1) % self.0.len()],
            None => self.0[0],
        }
    }
}

/// Compute the sort produced by clicking a field's header.
///
/// `from_default` is true while the current sort is the queryable's built-in
/// ordering and the user has not touched sorting yet. In that state a click on
/// a field that the default ordering sorts by flips it to the opposite
/// direction; afterwards the field's cycle applies as usual.
///
/// With `additive` the other keys are kept; otherwise the result contains only
/// the toggled field (or nothing).
pub fn toggle(
    current: &SortSpec,
    field: &str,
    cycle: &SortCycle,
    from_default: bool,
    additive: bool,
) -> SortSpec {
    let present = current.direction_of(field);
    let next = match present {
        Some(direction) if from_default => Some(direction.opposite()),
        _ => cycle.next(present),
    };

    if additive {
        let mut spec = current.clone();
        spec.set(field, next);
        spec
    } else {
        let mut spec = SortSpec::new();
        spec.set(field, next);
        spec
    }
}
