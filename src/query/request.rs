//! Query containers and execution requests
//!
//! A [`QueryContainer`] is the dynamic record a query arrives as: any subset
//! of raw string, processed terms, term ids, plus cached thresholds and
//! intersection selections keyed by `k`. [`QueryContainer::query`] collapses
//! it into an immutable [`QueryRequest`] ready for a driver.
//!
//! Containers round-trip through a JSON line format and a `id:raw` colon
//! format; presence of a field drives what gets serialized.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{Score, TermId};

/// Term and term-pair selections for maxscore-with-selections variants
///
/// Both sides are kept sorted and deduplicated; pairs are normalized to
/// `(min, max)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection<T: Ord + Copy> {
    pub selected_terms: Vec<T>,
    pub selected_pairs: Vec<(T, T)>,
}

impl<T: Ord + Copy> Selection<T> {
    pub fn new(terms: Vec<T>, pairs: Vec<(T, T)>) -> Self {
        let mut selection = Self {
            selected_terms: terms,
            selected_pairs: pairs,
        };
        selection.normalize();
        selection
    }

    fn normalize(&mut self) {
        self.selected_terms.sort_unstable();
        self.selected_terms.dedup();
        for pair in self.selected_pairs.iter_mut() {
            if pair.0 > pair.1 {
                *pair = (pair.1, pair.0);
            }
        }
        self.selected_pairs.sort_unstable();
        self.selected_pairs.dedup();
    }
}

/// Request flag bitset; all flags are set by default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFlags(u32);

impl RequestFlags {
    /// Carry the cached threshold into the request
    pub const THRESHOLD: RequestFlags = RequestFlags(0b001);
    /// Use term multiplicities as weights (all 1.0 when cleared)
    pub const WEIGHTS: RequestFlags = RequestFlags(0b010);
    /// Carry the cached selection into the request
    pub const SELECTION: RequestFlags = RequestFlags(0b100);

    pub const fn all() -> Self {
        RequestFlags(0b111)
    }

    pub const fn empty() -> Self {
        RequestFlags(0)
    }

    #[inline]
    pub fn contains(self, flag: RequestFlags) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub fn remove(&mut self, flag: RequestFlags) {
        self.0 &= !flag.0;
    }

    #[must_use]
    pub fn without(self, flag: RequestFlags) -> Self {
        RequestFlags(self.0 & !flag.0)
    }
}

impl Default for RequestFlags {
    fn default() -> Self {
        Self::all()
    }
}

impl std::ops::BitOr for RequestFlags {
    type Output = RequestFlags;
    fn bitor(self, rhs: Self) -> Self {
        RequestFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for RequestFlags {
    type Output = RequestFlags;
    fn bitand(self, rhs: Self) -> Self {
        RequestFlags(self.0 & rhs.0)
    }
}

impl std::ops::BitXor for RequestFlags {
    type Output = RequestFlags;
    fn bitxor(self, rhs: Self) -> Self {
        RequestFlags(self.0 ^ rhs.0)
    }
}

impl std::ops::BitOrAssign for RequestFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::ops::BitAndAssign for RequestFlags {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

/// A term string resolved against the lexicon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTerm {
    pub term: String,
    pub id: TermId,
}

/// Dynamic query record
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryContainer {
    id: Option<String>,
    query_string: Option<String>,
    processed_terms: Option<Vec<String>>,
    term_ids: Option<Vec<TermId>>,
    thresholds: Vec<(usize, Score)>,
    selections: Vec<(usize, Selection<usize>)>,
}

#[derive(Serialize, Deserialize)]
struct ThresholdEntry {
    k: usize,
    score: f32,
}

#[derive(Serialize, Deserialize)]
struct SelectionEntry {
    k: usize,
    intersections: Vec<u64>,
}

#[derive(Serialize, Deserialize, Default)]
struct QueryJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    terms: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    term_ids: Option<Vec<TermId>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    thresholds: Vec<ThresholdEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    selections: Vec<SelectionEntry>,
}

impl QueryContainer {
    /// Container holding only a raw query string
    pub fn raw(query_string: impl Into<String>) -> Self {
        Self {
            query_string: Some(query_string.into()),
            ..Self::default()
        }
    }

    /// Container from pre-processed terms; terms the processor rejects are
    /// dropped silently
    pub fn from_terms(
        terms: Vec<String>,
        processor: Option<&dyn Fn(&str) -> Option<String>>,
    ) -> Self {
        let processed = match processor {
            Some(process) => terms.iter().filter_map(|term| process(term)).collect(),
            None => terms,
        };
        Self {
            processed_terms: Some(processed),
            ..Self::default()
        }
    }

    /// Container from explicit term ids
    pub fn from_term_ids(term_ids: Vec<TermId>) -> Self {
        Self {
            term_ids: Some(term_ids),
            ..Self::default()
        }
    }

    /// Parse a JSON line
    ///
    /// At least one of `query`, `terms`, `term_ids` must be present.
    pub fn from_json(line: &str) -> Result<Self> {
        let wire: QueryJson = serde_json::from_str(line)
            .map_err(|err| Error::Query(format!("failed to parse JSON `{line}`: {err}")))?;
        if wire.query.is_none() && wire.terms.is_none() && wire.term_ids.is_none() {
            return Err(Error::Query(format!(
                "JSON must have either raw query, terms, or term IDs: {line}"
            )));
        }
        let mut selections = Vec::with_capacity(wire.selections.len());
        for entry in wire.selections {
            selections.push((entry.k, decode_intersections(&entry.intersections)?));
        }
        Ok(Self {
            id: wire.id,
            query_string: wire.query,
            processed_terms: wire.terms,
            term_ids: wire.term_ids,
            thresholds: wire.thresholds.into_iter().map(|t| (t.k, t.score)).collect(),
            selections,
        })
    }

    /// Parse a colon line: everything before the first `:` is the id; a line
    /// without `:` is all raw query
    pub fn from_colon_format(line: &str) -> Self {
        match line.split_once(':') {
            Some((id, raw)) => Self {
                id: Some(id.to_string()),
                query_string: Some(raw.to_string()),
                ..Self::default()
            },
            None => Self::raw(line),
        }
    }

    pub fn to_json_string(&self) -> Result<String> {
        let wire = QueryJson {
            id: self.id.clone(),
            query: self.query_string.clone(),
            terms: self.processed_terms.clone(),
            term_ids: self.term_ids.clone(),
            thresholds: self
                .thresholds
                .iter()
                .map(|&(k, score)| ThresholdEntry { k, score })
                .collect(),
            selections: self
                .selections
                .iter()
                .map(|(k, selection)| SelectionEntry {
                    k: *k,
                    intersections: encode_intersections(selection),
                })
                .collect(),
        };
        serde_json::to_string(&wire)
            .map_err(|err| Error::Query(format!("failed to serialize query: {err}")))
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    pub fn terms(&self) -> Option<&[String]> {
        self.processed_terms.as_deref()
    }

    pub fn term_ids(&self) -> Option<&[TermId]> {
        self.term_ids.as_deref()
    }

    /// Cached threshold for `k`
    pub fn threshold(&self, k: usize) -> Option<Score> {
        self.thresholds
            .iter()
            .find(|&&(key, _)| key == k)
            .map(|&(_, score)| score)
    }

    pub fn thresholds(&self) -> &[(usize, Score)] {
        &self.thresholds
    }

    /// Cached selection for `k`
    pub fn selection(&self, k: usize) -> Option<&Selection<usize>> {
        self.selections
            .iter()
            .find(|(key, _)| *key == k)
            .map(|(_, selection)| selection)
    }

    pub fn selections(&self) -> &[(usize, Selection<usize>)] {
        &self.selections
    }

    /// Replace the raw query string
    pub fn set_string(&mut self, query_string: impl Into<String>) -> &mut Self {
        self.query_string = Some(query_string.into());
        self
    }

    /// Resolve the raw string into processed terms and term ids
    ///
    /// Requires the raw string to be set.
    pub fn parse(&mut self, resolver: impl Fn(&str) -> Vec<ResolvedTerm>) -> Result<&mut Self> {
        let raw = self
            .query_string
            .as_ref()
            .ok_or_else(|| Error::Precondition("cannot parse, query string not set".into()))?;
        let resolved = resolver(raw);
        let mut terms = Vec::with_capacity(resolved.len());
        let mut ids = Vec::with_capacity(resolved.len());
        for term in resolved {
            terms.push(term.term);
            ids.push(term.id);
        }
        self.processed_terms = Some(terms);
        self.term_ids = Some(ids);
        Ok(self)
    }

    /// Upsert the threshold for `k`; returns whether an entry was overwritten
    pub fn add_threshold(&mut self, k: usize, score: Score) -> bool {
        if let Some(entry) = self.thresholds.iter_mut().find(|(key, _)| *key == k) {
            entry.1 = score;
            return true;
        }
        self.thresholds.push((k, score));
        false
    }

    /// Upsert the selection for `k`; returns whether an entry was overwritten
    pub fn add_selection(&mut self, k: usize, selection: Selection<usize>) -> bool {
        let mut selection = selection;
        selection.normalize();
        if let Some(entry) = self.selections.iter_mut().find(|(key, _)| *key == k) {
            entry.1 = selection;
            return true;
        }
        self.selections.push((k, selection));
        false
    }

    /// Retain terms at the given positions, in order, duplicates permitted
    pub fn filter_terms(&mut self, positions: &[usize]) -> Result<()> {
        let query_length = match (&self.processed_terms, &self.term_ids) {
            (Some(terms), _) => terms.len(),
            (None, Some(ids)) => ids.len(),
            (None, None) => return Ok(()),
        };
        for &position in positions {
            if position >= query_length {
                return Err(Error::Precondition(format!(
                    "term position {position} out of range for query of length {query_length}"
                )));
            }
        }
        if let Some(terms) = &self.processed_terms {
            self.processed_terms = Some(positions.iter().map(|&p| terms[p].clone()).collect());
        }
        if let Some(ids) = &self.term_ids {
            self.term_ids = Some(positions.iter().map(|&p| ids[p]).collect());
        }
        Ok(())
    }

    /// Build the execution request for `k` under the given flags
    ///
    /// Requires term ids to be set. Duplicate term ids collapse into
    /// (term, multiplicity); selections map term positions onto term ids.
    pub fn query(&self, k: usize, flags: RequestFlags) -> Result<QueryRequest> {
        let term_ids = self
            .term_ids
            .as_ref()
            .ok_or_else(|| Error::Precondition("query not parsed: term ids are not set".into()))?;

        let mut counts: FxHashMap<TermId, usize> = FxHashMap::default();
        for &term in term_ids {
            *counts.entry(term).or_insert(0) += 1;
        }
        let mut unique: Vec<(TermId, usize)> = counts.into_iter().collect();
        unique.sort_unstable_by_key(|&(term, _)| term);

        let term_weights = unique
            .iter()
            .map(|&(_, count)| {
                if flags.contains(RequestFlags::WEIGHTS) {
                    count as f32
                } else {
                    1.0
                }
            })
            .collect();
        let request_terms = unique.into_iter().map(|(term, _)| term).collect();

        let threshold = if flags.contains(RequestFlags::THRESHOLD) {
            self.threshold(k)
        } else {
            None
        };

        let selection = if flags.contains(RequestFlags::SELECTION) {
            match self.selection(k) {
                Some(positions) => Some(map_selection(positions, term_ids)?),
                None => None,
            }
        } else {
            None
        };

        Ok(QueryRequest {
            term_ids: request_terms,
            term_weights,
            k,
            threshold,
            selection,
        })
    }
}

fn map_selection(
    positions: &Selection<usize>,
    term_ids: &[TermId],
) -> Result<Selection<TermId>> {
    let lookup = |position: usize| -> Result<TermId> {
        term_ids.get(position).copied().ok_or_else(|| {
            Error::Query(format!(
                "selection position {position} out of range for {} terms",
                term_ids.len()
            ))
        })
    };
    let mut terms = Vec::with_capacity(positions.selected_terms.len());
    for &position in &positions.selected_terms {
        terms.push(lookup(position)?);
    }
    let mut pairs = Vec::with_capacity(positions.selected_pairs.len());
    for &(left, right) in &positions.selected_pairs {
        pairs.push((lookup(left)?, lookup(right)?));
    }
    Ok(Selection::new(terms, pairs))
}

fn decode_intersections(masks: &[u64]) -> Result<Selection<usize>> {
    let mut terms = Vec::new();
    let mut pairs = Vec::new();
    for &mask in masks {
        match mask.count_ones() {
            0 => {
                return Err(Error::Query("empty intersection mask".into()));
            }
            1 => terms.push(mask.trailing_zeros() as usize),
            2 => {
                let first = mask.trailing_zeros() as usize;
                let second = (63 - mask.leading_zeros()) as usize;
                pairs.push((first, second));
            }
            _ => {
                return Err(Error::Query(format!(
                    "only single term and pair selections are supported, got mask {mask:#b}"
                )));
            }
        }
    }
    Ok(Selection::new(terms, pairs))
}

fn encode_intersections(selection: &Selection<usize>) -> Vec<u64> {
    debug_assert!(
        selection.selected_terms.iter().all(|&t| t < 64)
            && selection
                .selected_pairs
                .iter()
                .all(|&(l, r)| l < 64 && r < 64)
    );
    let mut masks: Vec<u64> = selection
        .selected_terms
        .iter()
        .map(|&term| 1u64 << term)
        .chain(
            selection
                .selected_pairs
                .iter()
                .map(|&(left, right)| (1u64 << left) | (1u64 << right)),
        )
        .collect();
    masks.sort_unstable();
    masks
}

/// Immutable execution view of a query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    term_ids: Vec<TermId>,
    term_weights: Vec<f32>,
    k: usize,
    threshold: Option<Score>,
    selection: Option<Selection<TermId>>,
}

impl QueryRequest {
    /// Sorted unique term ids
    pub fn term_ids(&self) -> &[TermId] {
        &self.term_ids
    }

    /// Weights parallel to `term_ids`
    pub fn term_weights(&self) -> &[f32] {
        &self.term_weights
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn threshold(&self) -> Option<Score> {
        self.threshold
    }

    pub fn selection(&self) -> Option<&Selection<TermId>> {
        self.selection.as_ref()
    }
}
