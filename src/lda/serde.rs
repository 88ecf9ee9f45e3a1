use std::io::{Read, Write};

use ::serde::{Deserialize, Serialize};

use crate::error::{Result, TopicError};
use crate::lda::vocabulary::Vocabulary;
use crate::lda::TopicModel;

/// A trained model stored together with its vocabulary
/// K, α, β, seed, θ and φ travel inside the model, so a checkpoint is enough to
/// assign documents and rank terms again without retraining.
/// Stored as CBOR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCheckpoint {
    vocabulary: Vocabulary,
    model: TopicModel,
}

impl ModelCheckpoint {
    /// Pair a model with the vocabulary its φ columns refer to
    pub fn new(vocabulary: Vocabulary, model: TopicModel) -> Result<Self> {
        Self::check(&vocabulary, &model)?;
        Ok(Self { vocabulary, model })
    }

    fn check(vocabulary: &Vocabulary, model: &TopicModel) -> Result<()> {
        vocabulary.check_consistency()?;
        model.check_shape()?;
        if vocabulary.len() != model.vocab_size() {
            return Err(TopicError::invalid_input(format!(
                "vocabulary has {} tokens, model has {} columns",
                vocabulary.len(),
                model.vocab_size()
            )));
        }
        Ok(())
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn model(&self) -> &TopicModel {
        &self.model
    }

    pub fn into_parts(self) -> (Vocabulary, TopicModel) {
        (self.vocabulary, self.model)
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        serde_cbor::to_writer(writer, self)?;
        Ok(())
    }

    /// Read a checkpoint back
    /// Malformed matrices and vocabulary/model size mismatches are `InvalidInput`.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let checkpoint: Self = serde_cbor::from_reader(reader)?;
        Self::check(&checkpoint.vocabulary, &checkpoint.model)?;
        Ok(checkpoint)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_cbor::to_vec(self)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lda::corpus::Corpus;
    use crate::lda::evaluate::relevance::{assign, rank_terms};
    use crate::lda::vocabulary::VocabularyConfig;
    use crate::lda::LdaConfig;
    use crate::utils::math::RowMatrix;

    #[test]
    fn checkpoint_reproduces_downstream_results() {
        let docs = vec![
            vec!["rust", "cargo", "crate"],
            vec!["python", "pip", "wheel"],
            vec!["cargo", "crate", "rust", "rust"],
            vec!["wheel", "python", "pip"],
        ];
        let vocab = Vocabulary::build(&docs, &VocabularyConfig::default()).unwrap();
        let corpus = Corpus::encode(&docs, &vocab);
        let model = TopicModel::train(&corpus, &LdaConfig::new(2).max_iterations(30)).unwrap();

        let checkpoint = ModelCheckpoint::new(vocab.clone(), model.clone()).unwrap();
        let bytes = checkpoint.to_vec().unwrap();
        let restored = ModelCheckpoint::from_slice(&bytes).unwrap();
        assert_eq!(restored, checkpoint);

        let (restored_vocab, restored_model) = restored.into_parts();
        assert_eq!(restored_model.seed(), model.seed());
        assert_eq!(assign(&restored_model, &corpus).unwrap(), assign(&model, &corpus).unwrap());
        let marginal = corpus.marginal_term_distribution();
        assert_eq!(
            rank_terms(&restored_model, &restored_vocab, &marginal, 0.6).unwrap(),
            rank_terms(&model, &vocab, &marginal, 0.6).unwrap()
        );
    }

    fn small_model() -> (Vocabulary, TopicModel) {
        let docs = vec![vec!["a", "b"], vec!["b", "c"]];
        let vocab = Vocabulary::build(&docs, &VocabularyConfig::default()).unwrap();
        let corpus = Corpus::encode(&docs, &vocab);
        let model = TopicModel::train(&corpus, &LdaConfig::new(2).max_iterations(5)).unwrap();
        (vocab, model)
    }

    #[test]
    fn rejects_corrupt_matrices_on_load() {
        let (vocab, model) = small_model();
        // theta says 3 topics while the model has 2
        let bad = TopicModel {
            theta: RowMatrix::zeros(2, 3),
            ..model.clone()
        };
        assert!(matches!(
            ModelCheckpoint::new(vocab.clone(), bad.clone()),
            Err(TopicError::InvalidInput { .. })
        ));

        let bytes = serde_cbor::to_vec(&ModelCheckpoint {
            vocabulary: vocab.clone(),
            model: bad,
        })
        .unwrap();
        assert!(matches!(
            ModelCheckpoint::from_slice(&bytes),
            Err(TopicError::InvalidInput { .. })
        ));

        let bytes = serde_cbor::to_vec(&ModelCheckpoint {
            vocabulary: vocab,
            model,
        })
        .unwrap();
        assert!(ModelCheckpoint::from_slice(&bytes).is_ok());
    }

    #[test]
    fn rejects_truncated_matrix_buffer() {
        #[derive(::serde::Serialize)]
        struct RawMatrix {
            rows: usize,
            cols: usize,
            data: Vec<f64>,
        }
        #[derive(::serde::Serialize)]
        struct RawModel<'a> {
            n_topics: usize,
            alpha: f64,
            beta: f64,
            seed: u64,
            theta: RawMatrix,
            phi: &'a RowMatrix,
            iterations: usize,
            converged: bool,
            log_likelihood: Vec<f64>,
        }
        #[derive(::serde::Serialize)]
        struct RawCheckpoint<'a> {
            vocabulary: &'a Vocabulary,
            model: RawModel<'a>,
        }

        let (vocab, model) = small_model();
        let raw = RawCheckpoint {
            vocabulary: &vocab,
            model: RawModel {
                n_topics: 2,
                alpha: model.alpha(),
                beta: model.beta(),
                seed: model.seed(),
                theta: RawMatrix {
                    rows: 3,
                    cols: 2,
                    data: vec![0.5, 0.5],
                },
                phi: model.phi(),
                iterations: model.iterations(),
                converged: model.converged(),
                log_likelihood: Vec::new(),
            },
        };
        let bytes = serde_cbor::to_vec(&raw).unwrap();
        assert!(matches!(
            ModelCheckpoint::from_slice(&bytes),
            Err(TopicError::Serialization { .. })
        ));
    }

    #[test]
    fn rejects_mismatched_vocabulary() {
        let docs = vec![vec!["a", "b"], vec!["b", "c"]];
        let vocab = Vocabulary::build(&docs, &VocabularyConfig::default()).unwrap();
        let corpus = Corpus::encode(&docs, &vocab);
        let model = TopicModel::train(&corpus, &LdaConfig::new(2).max_iterations(5)).unwrap();
        let small = Vocabulary::build(&[vec!["a"]], &VocabularyConfig::default()).unwrap();
        assert!(matches!(
            ModelCheckpoint::new(small, model),
            Err(TopicError::InvalidInput { .. })
        ));
    }
}
