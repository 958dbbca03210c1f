//! The bit-packed columnar data plane.
//!
//! Everything the core reads during one term update lives here: packed
//! tensor-index columns, per-subset gradient/hessian storage with explicit
//! capability records, and the precomputed inner-bag tensors.

mod dataset;
mod packed;
mod subset;

pub use dataset::{BagTotal, InnerBag, TermInnerBag, TrainingSet};
pub use packed::PackedIndexes;
pub use subset::{DataSubset, FloatVec, FloatWidth, SubsetCaps, UintWidth};
