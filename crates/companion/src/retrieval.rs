//! Similarity search over the function catalog.
//!
//! A [`Collection`] stores embedded documents and answers nearest-neighbour queries;
//! the [`FunctionRetriever`] keeps it filled from the [`Catalog`](crate::catalog::Catalog)
//! and renders hits as text the model can read.

pub mod collection;
pub mod embedding;
pub mod mock;
pub mod retriever;

pub use collection::{Collection, Document, LocalCollection, Metadata};
pub use embedding::{Embedder, LocalEmbedder, OpenAiEmbedder};
pub use mock::MockEmbedder;
pub use retriever::{FunctionRetriever, PopulateOutcome, DEFAULT_TOP_K, NO_FUNCTIONS_FOUND};

pub const DEFAULT_COLLECTION: &str = "dudraw_functions_collection";
