//! Subscription filters and the matching engine.
//!
//! A subscription carries a list of [`Filter`]s. An event is delivered when at
//! least one filter matches it; within a filter every present constraint must
//! hold.

use std::{
    cell::OnceCell,
    collections::{BTreeMap, HashMap, HashSet},
};

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::event::Event;

/// A filter field carried a value of the wrong JSON type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("filter must be a JSON object")]
    NotObject,
    #[error("filter field {0} has the wrong type")]
    Field(String),
}

/// One disjunctive clause of a subscription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub ids: Option<HashSet<String>>,
    pub kinds: Option<HashSet<u64>>,
    pub authors: Option<HashSet<String>>,
    /// Inclusive lower bound on `created_at`.
    pub since: Option<i64>,
    /// Inclusive upper bound on `created_at`.
    pub until: Option<i64>,
    /// Accepted for compatibility; a relay without history has nothing to limit.
    pub limit: Option<u64>,
    /// Accepted for compatibility; full-text search is not supported.
    pub search: Option<String>,
    /// `#<letter>` queries keyed by tag name.
    pub tags: BTreeMap<String, HashSet<String>>,
}

impl Filter {
    /// Build a `Filter` from a Nostr filter JSON object.
    ///
    /// Only the types of recognized fields are checked. Array elements of the
    /// wrong type are dropped since they could never match anyway, and keys
    /// that are neither known fields nor `#` plus one character are ignored.
    pub fn from_value(val: &Value) -> Result<Self, FilterError> {
        let obj = val.as_object().ok_or(FilterError::NotObject)?;
        let mut f = Filter {
            ids: string_set(obj, "ids")?,
            authors: string_set(obj, "authors")?,
            kinds: array(obj, "kinds")?.map(|arr| arr.iter().filter_map(kind).collect()),
            since: timestamp(obj, "since", f64::ceil)?,
            until: timestamp(obj, "until", f64::floor)?,
            limit: number(obj, "limit")?.map(|n| n.as_u64().unwrap_or(0)),
            search: match obj.get("search") {
                None => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(_) => return Err(FilterError::Field("search".into())),
            },
            tags: BTreeMap::new(),
        };
        for key in obj.keys() {
            if let Some(name) = tag_query_name(key) {
                if let Some(values) = string_set(obj, key)? {
                    f.tags.insert(name.to_string(), values);
                }
            }
        }
        Ok(f)
    }

    /// Check whether `ev` satisfies every constraint of this filter.
    pub fn matches(&self, ev: &Event) -> bool {
        if self.tags.is_empty() {
            // fast path: no tag queries, no index needed
            return self.matches_with(ev, |_, _| true);
        }
        let index = TagIndex::new(ev);
        self.matches_indexed(ev, &index)
    }

    /// Like [`Filter::matches`], reusing a tag index built once for `ev`.
    pub fn matches_indexed(&self, ev: &Event, index: &TagIndex<'_>) -> bool {
        self.matches_with(ev, |name, wanted| index.intersects(name, wanted))
    }

    fn matches_with<F>(&self, ev: &Event, tag_clause: F) -> bool
    where
        F: Fn(&str, &HashSet<String>) -> bool,
    {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&ev.kind) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.contains(&ev.pubkey) {
                return false;
            }
        }
        if !self
            .tags
            .iter()
            .all(|(name, wanted)| tag_clause(name, wanted))
        {
            return false;
        }
        // rarely used when subscribing to live ephemeral traffic
        if let Some(since) = self.since {
            if ev.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if ev.created_at > until {
                return false;
            }
        }
        if let Some(ids) = &self.ids {
            if !ids.contains(&ev.id) {
                return false;
            }
        }
        true
    }
}

/// An event being matched against many filters.
///
/// The tag index is built on first use by a filter with tag queries and shared
/// by every later evaluation, so a broadcast pays for tag grouping at most once.
pub struct Candidate<'a> {
    event: &'a Event,
    index: OnceCell<TagIndex<'a>>,
}

impl<'a> Candidate<'a> {
    pub fn new(event: &'a Event) -> Self {
        Self {
            event,
            index: OnceCell::new(),
        }
    }

    pub fn event(&self) -> &'a Event {
        self.event
    }

    pub fn matches(&self, f: &Filter) -> bool {
        if f.tags.is_empty() {
            return f.matches(self.event);
        }
        let index = self.index.get_or_init(|| TagIndex::new(self.event));
        f.matches_indexed(self.event, index)
    }

    /// Logical OR over `filters`; an empty list matches nothing.
    pub fn matches_any(&self, filters: &[Filter]) -> bool {
        filters.iter().any(|f| self.matches(f))
    }
}

/// Tag values of one event grouped by tag name.
///
/// Building it costs one pass over the tags, so callers matching one event
/// against many filters should build it once and use
/// [`Filter::matches_indexed`].
#[derive(Debug, Default)]
pub struct TagIndex<'a> {
    by_name: HashMap<&'a str, HashSet<&'a str>>,
}

impl<'a> TagIndex<'a> {
    pub fn new(ev: &'a Event) -> Self {
        let mut by_name: HashMap<&str, HashSet<&str>> = HashMap::new();
        for tag in &ev.tags {
            if let Some(name) = tag.name() {
                by_name.entry(name).or_default().insert(tag.value());
            }
        }
        Self { by_name }
    }

    /// Whether any value of tags named `name` is in `wanted`.
    pub fn intersects(&self, name: &str, wanted: &HashSet<String>) -> bool {
        match self.by_name.get(name) {
            Some(values) => wanted.iter().any(|w| values.contains(w.as_str())),
            None => false,
        }
    }
}

/// `#e` → `Some("e")`; anything but `#` followed by exactly one character → `None`.
fn tag_query_name(key: &str) -> Option<&str> {
    let name = key.strip_prefix('#')?;
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(_), None) => Some(name),
        _ => None,
    }
}

fn array<'v>(
    obj: &'v Map<String, Value>,
    key: &str,
) -> Result<Option<&'v Vec<Value>>, FilterError> {
    match obj.get(key) {
        None => Ok(None),
        Some(Value::Array(arr)) => Ok(Some(arr)),
        Some(_) => Err(FilterError::Field(key.into())),
    }
}

fn string_set(
    obj: &Map<String, Value>,
    key: &str,
) -> Result<Option<HashSet<String>>, FilterError> {
    Ok(array(obj, key)?.map(|arr| {
        arr.iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }))
}

fn number<'v>(
    obj: &'v Map<String, Value>,
    key: &str,
) -> Result<Option<&'v Number>, FilterError> {
    match obj.get(key) {
        None => Ok(None),
        Some(Value::Number(n)) => Ok(Some(n)),
        Some(_) => Err(FilterError::Field(key.into())),
    }
}

/// A `kinds` element. `20001.0` is the same number as `20001`.
fn kind(v: &Value) -> Option<u64> {
    if let Some(k) = v.as_u64() {
        return Some(k);
    }
    let f = v.as_f64()?;
    (f >= 0.0 && f.fract() == 0.0 && f < u64::MAX as f64).then_some(f as u64)
}

/// Integer bound on `created_at`; fractional values are rounded with `round`
/// so that integer comparison gives the same answer as numeric comparison.
fn timestamp(
    obj: &Map<String, Value>,
    key: &str,
    round: fn(f64) -> f64,
) -> Result<Option<i64>, FilterError> {
    Ok(number(obj, key)?.map(|n| match (n.as_i64(), n.as_u64()) {
        (Some(i), _) => i,
        (None, Some(_)) => i64::MAX,
        // `as` saturates at the i64 bounds
        _ => round(n.as_f64().unwrap_or_default()) as i64,
    }))
}
