use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TopicError};
use crate::lda::corpus::{Corpus, EncodedDocument};

/// How co-occurrence windows are cut from a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CooccurrenceWindow {
    /// the whole document is one window
    Document,
    /// boolean sliding window of this many tokens
    /// documents shorter than the window form a single window
    Sliding(usize),
}

impl CooccurrenceWindow {
    pub fn validate(&self) -> Result<()> {
        if let CooccurrenceWindow::Sliding(0) = self {
            return Err(TopicError::invalid_range("sliding window size must be at least 1"));
        }
        Ok(())
    }
}

/// Window counts for a set of target terms
///
/// `occurrences[w]` counts windows containing w (every vocabulary term);
/// joint counts are kept only for rows of target terms and never include the
/// target itself.
#[derive(Debug, Clone)]
pub struct CooccurrenceStats {
    num_windows: u64,
    occurrences: Vec<u64>,
    /// target -> (other id, windows containing both), sorted by id
    joint: HashMap<u32, Vec<(u32, u64)>>,
}

#[derive(Debug, Default)]
struct Partial {
    num_windows: u64,
    occurrences: Vec<u64>,
    joint: HashMap<(u32, u32), u64>,
}

impl Partial {
    fn zeros(vocab_size: usize) -> Self {
        Self {
            num_windows: 0,
            occurrences: vec![0; vocab_size],
            joint: HashMap::new(),
        }
    }

    fn add_window(&mut self, window: &[u32], is_target: &[bool], scratch: &mut Vec<u32>) {
        scratch.clear();
        scratch.extend_from_slice(window);
        scratch.sort_unstable();
        scratch.dedup();

        self.num_windows += 1;
        for &id in scratch.iter() {
            self.occurrences[id as usize] += 1;
        }
        for &target in scratch.iter().filter(|&&id| is_target[id as usize]) {
            for &other in scratch.iter().filter(|&&id| id != target) {
                *self.joint.entry((target, other)).or_insert(0) += 1;
            }
        }
    }

    fn add_document(
        &mut self,
        doc: &EncodedDocument,
        window: CooccurrenceWindow,
        is_target: &[bool],
        scratch: &mut Vec<u32>,
    ) {
        let seq = doc.sequence();
        if seq.is_empty() {
            return;
        }
        match window {
            CooccurrenceWindow::Document => self.add_window(seq, is_target, scratch),
            CooccurrenceWindow::Sliding(size) if seq.len() <= size => {
                self.add_window(seq, is_target, scratch)
            }
            CooccurrenceWindow::Sliding(size) => {
                for start in 0..=(seq.len() - size) {
                    self.add_window(&seq[start..start + size], is_target, scratch);
                }
            }
        }
    }

    fn merge(mut self, other: Partial) -> Partial {
        self.num_windows += other.num_windows;
        for (a, b) in self.occurrences.iter_mut().zip(other.occurrences) {
            *a += b;
        }
        for (key, count) in other.joint {
            *self.joint.entry(key).or_insert(0) += count;
        }
        self
    }
}

impl CooccurrenceStats {
    /// Count windows over the corpus for the given target ids
    ///
    /// # Arguments
    /// * `corpus` - documents to scan
    /// * `targets` - term ids whose co-occurrence rows are needed
    /// * `window` - window policy
    pub fn collect(corpus: &Corpus, targets: &[u32], window: CooccurrenceWindow) -> Result<Self> {
        window.validate()?;
        let vocab_size = corpus.vocab_size();
        let mut is_target = vec![false; vocab_size];
        for &id in targets {
            let slot = is_target.get_mut(id as usize).ok_or_else(|| {
                TopicError::invalid_input(format!(
                    "target id {} outside vocabulary of size {}",
                    id, vocab_size
                ))
            })?;
            *slot = true;
        }

        let partial = corpus
            .documents()
            .par_iter()
            .fold(
                || (Partial::zeros(vocab_size), Vec::new()),
                |(mut acc, mut scratch), doc| {
                    acc.add_document(doc, window, &is_target, &mut scratch);
                    (acc, scratch)
                },
            )
            .map(|(acc, _)| acc)
            .reduce(|| Partial::zeros(vocab_size), Partial::merge);

        let mut joint: HashMap<u32, Vec<(u32, u64)>> = HashMap::new();
        for ((target, other), count) in partial.joint {
            joint.entry(target).or_default().push((other, count));
        }
        for row in joint.values_mut() {
            row.sort_unstable_by_key(|&(id, _)| id);
        }

        Ok(Self {
            num_windows: partial.num_windows,
            occurrences: partial.occurrences,
            joint,
        })
    }

    pub fn num_windows(&self) -> u64 {
        self.num_windows
    }

    /// windows containing `id`
    pub fn occurrences(&self, id: u32) -> u64 {
        self.occurrences.get(id as usize).copied().unwrap_or(0)
    }

    /// windows containing both `target` and `other` (`target` must be a target id)
    pub fn joint(&self, target: u32, other: u32) -> u64 {
        if target == other {
            return self.occurrences(target);
        }
        self.joint_row(target)
            .binary_search_by_key(&other, |&(id, _)| id)
            .map_or(0, |pos| self.joint_row(target)[pos].1)
    }

    /// every (other id, joint count) with a non-zero count, sorted by id
    pub fn joint_row(&self, target: u32) -> &[(u32, u64)] {
        self.joint.get(&target).map(|row| row.as_slice()).unwrap_or(&[])
    }

    #[inline]
    pub fn probability(&self, id: u32) -> f64 {
        if self.num_windows == 0 {
            return 0.0;
        }
        self.occurrences(id) as f64 / self.num_windows as f64
    }

    #[inline]
    pub fn joint_probability(&self, target: u32, other: u32) -> f64 {
        if self.num_windows == 0 {
            return 0.0;
        }
        self.joint(target, other) as f64 / self.num_windows as f64
    }
}
