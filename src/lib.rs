pub mod context;
pub mod detector;
pub mod eval;
pub mod matching;
pub mod pattern;
pub mod rule;
pub mod signature;

pub use context::DetectionContext;
pub use detector::{Detection, DetectionReport, ProviderDetector};
pub use eval::{evaluate, Evaluator};
pub use rule::{Leaf, Rule};
pub use signature::{Catalog, CatalogError, Category, ProviderSignature};
