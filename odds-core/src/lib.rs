//! Shared domain model, market registry, source normalizers, margin math,
//! snapshot storage, and fixture matching used by both `odds-engine` and
//! `odds-api`.

pub mod error;
pub mod margin;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod registry;
pub mod snapshot_store;

pub use error::{MappingError, ProblemDocument, ScrapeErrorType};
pub use model::Platform;
pub use registry::MarketRegistry;
