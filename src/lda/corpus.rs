use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TopicError};
use crate::lda::vocabulary::Vocabulary;
use crate::utils::sort::radix_sort_u32_soa;

/// One document in bag-of-words form
/// `entries` holds (token id, count) sorted by id, count >= 1, ids unique.
/// `sequence` keeps the in-vocabulary ids in their original order for
/// window-based co-occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedDocument {
    /// position in the corpus, used to join back to external metadata
    index: usize,
    entries: Vec<(u32, u32)>,
    sequence: Vec<u32>,
}

impl EncodedDocument {
    fn from_sequence(index: usize, sequence: Vec<u32>) -> Self {
        // id -> count (初出順で集計してから id 順に並べ替え)
        let mut counts: IndexMap<u32, u32> = IndexMap::with_capacity(sequence.len());
        for &id in &sequence {
            *counts.entry(id).or_insert(0) += 1;
        }
        let (mut ids, mut vals): (Vec<u32>, Vec<u32>) = counts.into_iter().unzip();
        radix_sort_u32_soa(&mut ids, &mut vals);
        Self {
            index,
            entries: ids.into_iter().zip(vals).collect(),
            sequence,
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// (token id, count), sorted by id
    #[inline]
    pub fn entries(&self) -> &[(u32, u32)] {
        &self.entries
    }

    /// in-vocabulary token ids in source order
    #[inline]
    pub fn sequence(&self) -> &[u32] {
        &self.sequence
    }

    /// number of token occurrences
    #[inline]
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// count of one token id in this document (0 if absent)
    pub fn count(&self, id: u32) -> u32 {
        self.entries
            .binary_search_by_key(&id, |&(i, _)| i)
            .map_or(0, |pos| self.entries[pos].1)
    }
}

/// Ordered collection of encoded documents over a fixed vocabulary size
/// Immutable once built; safe to share across threads read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    documents: Vec<EncodedDocument>,
    vocab_size: usize,
}

impl Corpus {
    /// Encode tokenized documents against a vocabulary
    ///
    /// Out-of-vocabulary tokens are dropped. Every input document yields
    /// exactly one encoded document in the same position, empty or not.
    pub fn encode<D, T>(documents: &[D], vocabulary: &Vocabulary) -> Self
    where
        D: AsRef<[T]> + Sync,
        T: AsRef<str> + Sync,
    {
        let documents = documents
            .par_iter()
            .enumerate()
            .map(|(index, doc)| {
                let sequence: Vec<u32> = doc
                    .as_ref()
                    .iter()
                    .filter_map(|token| vocabulary.id(token.as_ref()))
                    .collect();
                EncodedDocument::from_sequence(index, sequence)
            })
            .collect();
        Self {
            documents,
            vocab_size: vocabulary.len(),
        }
    }

    /// Build a corpus from already-encoded (id, count) rows
    ///
    /// Token order is unknown for such input, so each document's sequence is
    /// the entries expanded in id order; window co-occurrence then degrades
    /// to document-level co-occurrence.
    pub fn from_sparse(rows: Vec<Vec<(u32, u32)>>, vocab_size: usize) -> Result<Self> {
        let mut documents = Vec::with_capacity(rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            let (mut ids, mut counts): (Vec<u32>, Vec<u32>) = row.into_iter().unzip();
            radix_sort_u32_soa(&mut ids, &mut counts);
            for (pos, (&id, &count)) in ids.iter().zip(counts.iter()).enumerate() {
                if id as usize >= vocab_size {
                    return Err(TopicError::invalid_input(format!(
                        "document {} references token id {} outside vocabulary of size {}",
                        index, id, vocab_size
                    )));
                }
                if count == 0 {
                    return Err(TopicError::invalid_input(format!(
                        "document {} has a zero count for token id {}",
                        index, id
                    )));
                }
                if pos > 0 && ids[pos - 1] == id {
                    return Err(TopicError::invalid_input(format!(
                        "document {} lists token id {} twice",
                        index, id
                    )));
                }
            }
            let sequence = ids
                .iter()
                .zip(counts.iter())
                .flat_map(|(&id, &count)| std::iter::repeat(id).take(count as usize))
                .collect();
            documents.push(EncodedDocument {
                index,
                entries: ids.into_iter().zip(counts).collect(),
                sequence,
            });
        }
        Ok(Self {
            documents,
            vocab_size,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// V of the vocabulary this corpus was encoded with
    #[inline]
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    #[inline]
    pub fn documents(&self) -> &[EncodedDocument] {
        &self.documents
    }

    pub fn get(&self, index: usize) -> Option<&EncodedDocument> {
        self.documents.get(index)
    }

    pub fn total_tokens(&self) -> u64 {
        self.documents.iter().map(|d| d.len() as u64).sum()
    }

    /// corpus-wide occurrence count per token id
    pub fn term_counts(&self) -> Vec<u64> {
        let mut counts = vec![0u64; self.vocab_size];
        for doc in &self.documents {
            for &(id, count) in doc.entries() {
                counts[id as usize] += count as u64;
            }
        }
        counts
    }

    /// p(w): share of all token occurrences that are token w
    /// All zeros if the corpus holds no tokens at all.
    pub fn marginal_term_distribution(&self) -> Vec<f64> {
        let counts = self.term_counts();
        let total: u64 = counts.iter().sum();
        if total == 0 {
            return vec![0.0; self.vocab_size];
        }
        counts
            .into_iter()
            .map(|c| c as f64 / total as f64)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lda::vocabulary::VocabularyConfig;

    fn docs() -> Vec<Vec<&'static str>> {
        vec![vec!["a", "b", "a"], vec!["b", "c"], vec!["a", "c", "c"]]
    }

    #[test]
    fn encodes_counts_in_input_order() {
        let docs = docs();
        let vocab = Vocabulary::build(&docs, &VocabularyConfig::new(1, 1.0, 10)).unwrap();
        let corpus = Corpus::encode(&docs, &vocab);

        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.vocab_size(), 3);
        let doc0 = corpus.get(0).unwrap();
        assert_eq!(doc0.count(vocab.id("a").unwrap()), 2);
        assert_eq!(doc0.count(vocab.id("b").unwrap()), 1);
        assert_eq!(doc0.count(vocab.id("c").unwrap()), 0);
        assert_eq!(doc0.entries().len(), 2);
        assert_eq!(doc0.len(), 3);
        for (idx, doc) in corpus.documents().iter().enumerate() {
            assert_eq!(doc.index(), idx);
        }
    }

    #[test]
    fn drops_unknown_tokens_but_keeps_empty_documents() {
        let docs = docs();
        let vocab = Vocabulary::build(&docs, &VocabularyConfig::default()).unwrap();
        let other = vec![vec!["zzz", "yyy"], vec!["c", "zzz", "a"]];
        let corpus = Corpus::encode(&other, &vocab);

        assert_eq!(corpus.len(), 2);
        assert!(corpus.get(0).unwrap().is_empty());
        let doc1 = corpus.get(1).unwrap();
        assert_eq!(doc1.sequence(), &[vocab.id("c").unwrap(), vocab.id("a").unwrap()]);
        for &(id, count) in doc1.entries() {
            assert!((id as usize) < vocab.len());
            assert!(count >= 1);
        }
    }

    #[test]
    fn marginal_distribution_sums_to_one() {
        let docs = docs();
        let vocab = Vocabulary::build(&docs, &VocabularyConfig::default()).unwrap();
        let corpus = Corpus::encode(&docs, &vocab);
        assert_eq!(corpus.total_tokens(), 8);
        let marginal = corpus.marginal_term_distribution();
        assert!((marginal.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((marginal[vocab.id("a").unwrap() as usize] - 3.0 / 8.0).abs() < 1e-12);
    }

    #[test]
    fn from_sparse_validates_rows() {
        let corpus = Corpus::from_sparse(vec![vec![(2, 1), (0, 3)], vec![]], 3).unwrap();
        assert_eq!(corpus.get(0).unwrap().entries(), &[(0, 3), (2, 1)]);
        assert_eq!(corpus.get(0).unwrap().sequence(), &[0, 0, 0, 2]);
        assert!(corpus.get(1).unwrap().is_empty());

        for rows in [vec![vec![(3u32, 1u32)]], vec![vec![(0, 0)]], vec![vec![(1, 1), (1, 2)]]] {
            let err = Corpus::from_sparse(rows, 3).unwrap_err();
            assert!(matches!(err, TopicError::InvalidInput { .. }));
        }
    }
}
