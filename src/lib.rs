/// This crate is a topic discovery engine for tokenized short documents using
/// Latent Dirichlet Allocation.
pub mod error;
pub mod lda;
pub mod utils;

/// Crate error type
/// Every fallible operation returns `topic_lens::Result<T>` with one of these
/// variants; configuration errors are raised before any work starts.
pub use error::{Result, TopicError};

/// Vocabulary
/// Maps normalized token strings to dense ids `0..V`.
/// Built from tokenized documents by document-frequency pruning:
/// - tokens in fewer than `min_doc_freq` documents are dropped
/// - tokens in more than `max_doc_freq_fraction` of documents are dropped
/// - the survivors are ordered by descending document frequency (ties by first
///   appearance) and truncated to `max_size`
///
/// Immutable once built.
///
/// # Serialization
/// Supported.
pub use lda::vocabulary::{Vocabulary, VocabularyConfig};

/// Corpus
/// Ordered bag-of-words documents encoded against a `Vocabulary`.
/// Document order is preserved, and documents left without any in-vocabulary
/// token stay in place as empty documents, so a document index always points
/// back to the same source record.
///
/// # Serialization
/// Supported.
pub use lda::corpus::{Corpus, EncodedDocument};

/// LDA model and its training configuration
/// `TopicModel::train` fits K topics with collapsed Gibbs sampling. The
/// sampling step runs over document batches in parallel; the topic-term counts
/// are summed at a barrier after every sweep.
///
/// The model holds:
/// - K, α, β and the seed it was trained with
/// - θ: documents x topics
/// - φ: topics x vocabulary
/// - the log-likelihood trace and whether it converged
///
/// Identical corpus, configuration and seed give an identical model regardless
/// of the thread count or `batch_size`.
///
/// # Serialization
/// Supported, see `ModelCheckpoint` for storing it with its vocabulary.
pub use lda::{LdaConfig, TopicModel};

/// Model checkpoint
/// A `TopicModel` bundled with its `Vocabulary`, stored as CBOR.
pub use lda::serde::ModelCheckpoint;

/// Coherence evaluation
/// `score` rates one model (c_v by default), `sweep` trains and scores one
/// isolated model per candidate K and returns `(K, coherence)` in input order.
pub use lda::evaluate::coherence::{
    score, score_topics, sweep, sweep_with_cancel, topic_diversity, CoherenceConfig, CoherenceMetric,
    CoherenceReport, TopicCoherence,
};
pub use lda::evaluate::cooccurrence::CooccurrenceWindow;

/// Topic assignment and term ranking
/// `assign` gives every document its dominant topic, `rank_terms` orders each
/// topic's terms by λ-weighted relevance, and `TopicOrder` maps model topic ids
/// to the prevalence-ordered numbering used by topic visualizations.
pub use lda::evaluate::relevance::{
    assign, documents_for_topic, rank_terms, select_with_metadata, DocumentMeta, RankedTerm,
    TermRanking, TopicAssignment, TopicOrder,
};

/// Cooperative cancellation for training runs and sweeps
pub use utils::cancel::CancelToken;
