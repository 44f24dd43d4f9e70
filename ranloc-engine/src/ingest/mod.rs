//! Measurement ingestion: socket server, wire codec, bounded queue

pub mod codec;
pub mod queue;
pub mod task;

pub use codec::{decode, encode, IngestCodecError, FULL_FIELD_COUNT, REDUCED_FIELD_COUNT};
pub use queue::{IngestQueue, QueueStats};
pub use task::IngestTask;
