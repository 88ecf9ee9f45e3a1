pub mod cooccurrence;
pub mod coherence;
pub mod relevance;
