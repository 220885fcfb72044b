//! Content-generation pipeline
//!
//! Stage structure, leaf-first: the similarity index and dedup gate feed
//! the batch generator, which feeds the generation queue; the publisher
//! promotes queue items into the live store and fans out enrichment.

pub mod batch;
pub mod dedup;
pub mod enrichment;
pub mod publisher;
pub mod similarity;

pub use batch::{BatchGenerator, BatchOutcome};
pub use dedup::{DeduplicationGate, GateDecision, SimilarityResult};
pub use enrichment::EnrichmentFanout;
pub use publisher::{PublishOutcome, Publisher};
pub use similarity::SimilarityIndex;
