pub mod assembler;
pub mod chunk_store;
pub mod extension;
pub mod locks;
pub mod objects;

pub use assembler::{Assembler, MergeRequest};
pub use chunk_store::{ChunkOutcome, ChunkStore, SweepReport};
pub use extension::{ExtensionCheck, ExtensionPolicy};
pub use objects::ObjectStore;
