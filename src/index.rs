//! Prefix-bucketed fuzzy search index over the catalog.
//!
//! Names are sliced into 2- and 3-grams; each gram maps to the ordered,
//! deduplicated list of items containing it. A query first narrows to a
//! single bucket, then a substring ranker orders the survivors, so even
//! a one-bucket miss never scans the full corpus.

use crate::cache::SearchItem;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

const MIN_PREFIX_LEN: usize = 2;
const MAX_PREFIX_LEN: usize = 3;
const INDEX_VERSION: u32 = 1;

/// A ranked search hit. `index` refers into the corpus passed to
/// [`PrefixIndex::build`], so callers can join back to the full record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub index: usize,
    pub score: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PrefixIndex {
    prefixes: HashMap<String, Vec<u32>>,
    items: Vec<SearchItem>,
    version: u32,
    total_items: usize,
}

impl PrefixIndex {
    pub fn new() -> Self {
        Self {
            version: INDEX_VERSION,
            ..Default::default()
        }
    }

    /// Build the gram buckets from a fresh corpus, replacing any
    /// previous contents.
    pub fn build(&mut self, items: Vec<SearchItem>) {
        self.total_items = items.len();
        self.prefixes.clear();

        for (idx, item) in items.iter().enumerate() {
            let name = item.name.to_lowercase();
            let bytes = name.as_bytes();

            for length in MIN_PREFIX_LEN..=MAX_PREFIX_LEN.min(bytes.len()) {
                for start in 0..=bytes.len() - length {
                    // Names are ASCII in practice; skip the rare gram
                    // that would split a multi-byte character.
                    let Some(gram) = name.get(start..start + length) else {
                        continue;
                    };
                    self.prefixes
                        .entry(gram.to_string())
                        .or_default()
                        .push(idx as u32);
                }
            }
        }

        for bucket in self.prefixes.values_mut() {
            let mut seen = std::collections::HashSet::with_capacity(bucket.len());
            bucket.retain(|&idx| seen.insert(idx));
        }

        self.items = items;
    }

    pub fn items(&self) -> &[SearchItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Bucket lookup without ranking.
    ///
    /// Queries shorter than two characters return the whole corpus;
    /// longer queries read the 3-gram bucket and filter by substring.
    pub fn search_prefix(&self, query: &str) -> Vec<&SearchItem> {
        if query.len() < MIN_PREFIX_LEN {
            return self.items.iter().collect();
        }

        let query = query.to_lowercase();

        if query.len() > MAX_PREFIX_LEN {
            let Some(gram) = query.get(..MAX_PREFIX_LEN) else {
                return Vec::new();
            };
            return self
                .bucket(gram)
                .iter()
                .map(|&idx| &self.items[idx as usize])
                .filter(|item| item.name.to_lowercase().contains(&query))
                .collect();
        }

        self.bucket(&query)
            .iter()
            .map(|&idx| &self.items[idx as usize])
            .collect()
    }

    /// Ranked lookup. Candidates come from the gram bucket; the ranker
    /// orders them and maps indices back into the full corpus.
    pub fn search_fuzzy(&self, query: &str) -> Vec<Match> {
        if query.len() < MIN_PREFIX_LEN {
            let indices: Vec<u32> = (0..self.items.len() as u32).collect();
            return self.rank(&indices, query);
        }

        let mut gram = query.to_lowercase();
        if gram.len() > MAX_PREFIX_LEN {
            let mut end = MAX_PREFIX_LEN;
            while !gram.is_char_boundary(end) {
                end -= 1;
            }
            gram.truncate(end);
        }

        let candidates = self.bucket(&gram);
        if candidates.is_empty() {
            return Vec::new();
        }
        self.rank(candidates, query)
    }

    fn bucket(&self, gram: &str) -> &[u32] {
        self.prefixes.get(gram).map(Vec::as_slice).unwrap_or(&[])
    }

    fn rank(&self, candidates: &[u32], query: &str) -> Vec<Match> {
        let query = query.to_lowercase();
        let mut matches: Vec<Match> = candidates
            .iter()
            .filter_map(|&idx| {
                let item = &self.items[idx as usize];
                score_item(item, &query).map(|score| Match {
                    index: idx as usize,
                    score,
                })
            })
            .collect();

        matches.sort_by(|a, b| b.score.cmp(&a.score).then(a.index.cmp(&b.index)));
        matches
    }

    pub fn stats(&self) -> (usize, usize, f64) {
        let bucket_count = self.prefixes.len();
        let avg = if bucket_count > 0 {
            let total: usize = self.prefixes.values().map(Vec::len).sum();
            total as f64 / bucket_count as f64
        } else {
            0.0
        };
        (bucket_count, self.total_items, avg)
    }

    /// Persist the index; versioned so a format change forces a rebuild.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let data = bincode::serialize(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, data)
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let data = fs::read(path)?;
        let index: Self = bincode::deserialize(&data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if index.version != INDEX_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "prefix index version mismatch: got {}, expected {INDEX_VERSION}",
                    index.version
                ),
            ));
        }
        Ok(index)
    }
}

/// Substring ranker with a position bonus: name matches beat description
/// matches, earlier positions beat later ones, and tighter names beat
/// longer ones.
fn score_item(item: &SearchItem, query: &str) -> Option<i64> {
    let name = item.name.to_lowercase();

    if let Some(pos) = name.find(query) {
        let mut score = 1000 - pos as i64 * 10 - (name.len() as i64 - query.len() as i64);
        if pos == 0 {
            score += 100;
        }
        if name == *query {
            score += 500;
        }
        return Some(score);
    }

    let desc = item.desc.to_lowercase();
    desc.find(query).map(|pos| 100 - (pos as i64).min(99))
}
