use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TopicError};

/// Document-frequency pruning bounds for `Vocabulary::build`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularyConfig {
    /// Tokens appearing in fewer documents than this are dropped
    pub min_doc_freq: usize,
    /// Tokens appearing in a larger share of documents than this are dropped
    /// Must lie in (0, 1].
    pub max_doc_freq_fraction: f64,
    /// Upper bound on the vocabulary size (>= 1)
    pub max_size: usize,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            min_doc_freq: 1,
            max_doc_freq_fraction: 1.0,
            max_size: 100_000,
        }
    }
}

impl VocabularyConfig {
    pub fn new(min_doc_freq: usize, max_doc_freq_fraction: f64, max_size: usize) -> Self {
        Self {
            min_doc_freq,
            max_doc_freq_fraction,
            max_size,
        }
    }

    pub fn min_doc_freq(mut self, n: usize) -> Self {
        self.min_doc_freq = n;
        self
    }

    pub fn max_doc_freq_fraction(mut self, fraction: f64) -> Self {
        self.max_doc_freq_fraction = fraction;
        self
    }

    pub fn max_size(mut self, n: usize) -> Self {
        self.max_size = n;
        self
    }

    /// Reject out-of-range bounds before touching any document
    pub fn validate(&self) -> Result<()> {
        // NaN もここで弾かれる
        if !(self.max_doc_freq_fraction > 0.0 && self.max_doc_freq_fraction <= 1.0) {
            return Err(TopicError::invalid_range(format!(
                "max_doc_freq_fraction must be in (0, 1], got {}",
                self.max_doc_freq_fraction
            )));
        }
        if self.max_size < 1 {
            return Err(TopicError::invalid_range("max_size must be at least 1"));
        }
        Ok(())
    }
}

/// Frozen token <-> id mapping
/// Ids are contiguous in [0, len) and follow decreasing document frequency,
/// ties broken by the order in which tokens were first seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    /// index in the set == token id
    tokens: IndexSet<Box<str>>,
    /// document frequency per id
    doc_freqs: Vec<u32>,
    /// number of documents the vocabulary was built from
    num_docs: u64,
}

impl Vocabulary {
    /// Build a vocabulary from tokenized documents
    ///
    /// # Arguments
    /// * `documents` - tokenized documents, in corpus order
    /// * `config` - document-frequency bounds and size cap
    ///
    /// # Returns
    /// * `Vocabulary` - or `InvalidRange` / `EmptyVocabulary`
    pub fn build<D, T>(documents: &[D], config: &VocabularyConfig) -> Result<Self>
    where
        D: AsRef<[T]>,
        T: AsRef<str>,
    {
        config.validate()?;

        // token -> doc freq (挿入順 = 初出順)
        let mut stats: IndexMap<&str, u32> = IndexMap::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for doc in documents {
            seen.clear();
            for token in doc.as_ref() {
                let token = token.as_ref();
                if seen.insert(token) {
                    *stats.entry(token).or_insert(0) += 1;
                }
            }
        }

        let num_docs = documents.len();
        let distinct = stats.len();
        let mut survivors: Vec<(&str, u32)> = stats
            .into_iter()
            .filter(|&(_, df)| {
                df as usize >= config.min_doc_freq
                    && df as f64 / num_docs as f64 <= config.max_doc_freq_fraction
            })
            .collect();

        // stable sort keeps first-seen order among equal frequencies
        survivors.sort_by(|a, b| b.1.cmp(&a.1));
        survivors.truncate(config.max_size);

        if survivors.is_empty() {
            return Err(TopicError::empty_vocabulary(format!(
                "all {} distinct tokens from {} documents were filtered out",
                distinct, num_docs
            )));
        }

        debug!(
            documents = num_docs,
            distinct,
            kept = survivors.len(),
            "vocabulary built"
        );

        let mut tokens = IndexSet::with_capacity(survivors.len());
        let mut doc_freqs = Vec::with_capacity(survivors.len());
        for (token, df) in survivors {
            tokens.insert(Box::<str>::from(token));
            doc_freqs.push(df);
        }
        Ok(Self {
            tokens,
            doc_freqs,
            num_docs: num_docs as u64,
        })
    }

    /// Number of tokens (V)
    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// token -> id
    #[inline]
    pub fn id(&self, token: &str) -> Option<u32> {
        self.tokens.get_index_of(token).map(|idx| idx as u32)
    }

    /// id -> token
    #[inline]
    pub fn token(&self, id: u32) -> Option<&str> {
        self.tokens.get_index(id as usize).map(|t| t.as_ref())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    pub fn doc_freq(&self, id: u32) -> Option<u32> {
        self.doc_freqs.get(id as usize).copied()
    }

    pub fn num_docs(&self) -> u64 {
        self.num_docs
    }

    pub(crate) fn check_consistency(&self) -> Result<()> {
        if self.doc_freqs.len() != self.tokens.len() {
            return Err(TopicError::invalid_input(format!(
                "vocabulary has {} tokens but {} document frequencies",
                self.tokens.len(),
                self.doc_freqs.len()
            )));
        }
        Ok(())
    }

    /// (id, token) pairs in id order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.tokens
            .iter()
            .enumerate()
            .map(|(idx, t)| (idx as u32, t.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs() -> Vec<Vec<&'static str>> {
        vec![vec!["a", "b", "a"], vec!["b", "c"], vec!["a", "c", "c"]]
    }

    #[test]
    fn keeps_all_tokens_without_pruning() {
        let vocab = Vocabulary::build(&docs(), &VocabularyConfig::new(1, 1.0, 10)).unwrap();
        assert_eq!(vocab.len(), 3);
        // every token has df = 2, so ids follow first-seen order
        assert_eq!(vocab.id("a"), Some(0));
        assert_eq!(vocab.id("b"), Some(1));
        assert_eq!(vocab.id("c"), Some(2));
        assert_eq!(vocab.token(2), Some("c"));
        assert_eq!(vocab.doc_freq(0), Some(2));
        assert_eq!(vocab.num_docs(), 3);
    }

    #[test]
    fn ids_follow_document_frequency() {
        let docs = vec![vec!["x", "y"], vec!["y", "z"], vec!["y", "z"]];
        let vocab = Vocabulary::build(&docs, &VocabularyConfig::default()).unwrap();
        let order: Vec<&str> = vocab.iter().map(|(_, t)| t).collect();
        assert_eq!(order, vec!["y", "z", "x"]);
    }

    #[test]
    fn prunes_by_document_frequency() {
        let docs = vec![
            vec!["common", "rare"],
            vec!["common", "mid"],
            vec!["common", "mid"],
            vec!["common"],
        ];
        // common: 4/4 > 0.9 -> dropped, rare: 1 < 2 -> dropped
        let config = VocabularyConfig::new(2, 0.9, 10);
        let vocab = Vocabulary::build(&docs, &config).unwrap();
        assert_eq!(vocab.len(), 1);
        assert!(vocab.contains("mid"));
        assert!(!vocab.contains("common"));
        assert!(!vocab.contains("rare"));
    }

    #[test]
    fn max_size_keeps_most_frequent() {
        let docs = vec![vec!["p", "q", "r"], vec!["q", "r"], vec!["r"]];
        let vocab = Vocabulary::build(&docs, &VocabularyConfig::new(1, 1.0, 2)).unwrap();
        assert_eq!(vocab.len(), 2);
        assert_eq!(vocab.id("r"), Some(0));
        assert_eq!(vocab.id("q"), Some(1));
        assert_eq!(vocab.id("p"), None);
    }

    #[test]
    fn rejects_invalid_ranges() {
        for config in [
            VocabularyConfig::new(1, 0.0, 10),
            VocabularyConfig::new(1, 1.5, 10),
            VocabularyConfig::new(1, f64::NAN, 10),
            VocabularyConfig::new(1, 1.0, 0),
        ] {
            let err = Vocabulary::build(&docs(), &config).unwrap_err();
            assert!(matches!(err, TopicError::InvalidRange { .. }), "{:?}", config);
        }
    }

    #[test]
    fn inconsistent_document_frequencies_are_rejected() {
        let mut vocab = Vocabulary::build(&docs(), &VocabularyConfig::default()).unwrap();
        assert!(vocab.check_consistency().is_ok());
        vocab.doc_freqs.pop();
        assert!(matches!(vocab.check_consistency(), Err(TopicError::InvalidInput { .. })));

        // a checkpoint built around it is refused as well
        let corpus = crate::lda::corpus::Corpus::from_sparse(vec![vec![(0, 1), (2, 1)]], 3).unwrap();
        let model = crate::lda::TopicModel::train(&corpus, &crate::lda::LdaConfig::new(2).max_iterations(3)).unwrap();
        assert!(matches!(
            crate::lda::serde::ModelCheckpoint::new(vocab, model),
            Err(TopicError::InvalidInput { .. })
        ));
    }

    #[test]
    fn empty_after_filtering() {
        let err = Vocabulary::build(&docs(), &VocabularyConfig::new(5, 1.0, 10)).unwrap_err();
        assert!(matches!(err, TopicError::EmptyVocabulary { .. }));

        let none: Vec<Vec<&str>> = Vec::new();
        let err = Vocabulary::build(&none, &VocabularyConfig::default()).unwrap_err();
        assert!(matches!(err, TopicError::EmptyVocabulary { .. }));
    }
}
