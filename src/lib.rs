//! cycleboost: the term-update generation core of a cyclic gradient-boosting
//! engine for explainable additive models over binned features.
//!
//! Given a booster shell holding pre-binned training data, per-sample
//! gradients and hessians, and inner-bag resamplings, one call to
//! [`generate_term_update`] produces a tensor-shaped score update for a
//! single term (a feature or a small feature interaction) together with its
//! gain. The model-wide boosting loop, raw-data binning, and objective
//! functions live outside this crate.
//!
//! # Overview
//!
//! ```text
//! generate_term_update
//!   per inner bag:
//!     scatter gradients into fast bins (per subset, SIMD lane planes)
//!     convert + add into wide main bins
//!     partition: zero-D | greedy 1-D | joint 2-D over totals | random
//!     accumulate the inner update tensor into the outer one
//!   scale by the learning rate, report the aggregate gain
//! ```
//!
//! # Example
//!
//! ```
//! use cycleboost::{BoosterConfig, BoosterCore, BoosterShell, SplitRng, TermBoostFlags};
//!
//! // Two-bin feature with perfectly separated gradients.
//! let mut builder = BoosterCore::builder(BoosterConfig::default());
//! builder.add_feature(2, vec![0, 0, 1, 1]);
//! let term = builder.add_term(&[0]);
//! builder.gradients(vec![2.0, 2.0, -2.0, -2.0]);
//! builder.hessians(vec![1.0; 4]);
//!
//! let mut shell = BoosterShell::new(builder.build().unwrap());
//! let mut rng = SplitRng::seed_from_u64(42);
//! let gain = shell
//!     .generate_term_update(
//!         Some(&mut rng),
//!         term,
//!         TermBoostFlags::empty(),
//!         0.5,               // learning rate
//!         1,                 // min samples per leaf
//!         1e-3,              // min hessian
//!         Some(&[2]),        // leaves per dimension
//!         None,              // no monotone constraints
//!     )
//!     .unwrap();
//! assert!(gain > 0.0);
//! assert_eq!(shell.term_update().cuts(0), &[1]);
//! ```

pub mod boost;
pub mod data;
pub mod error;
pub mod flags;
pub mod histogram;
pub mod logging;
pub mod rng;
pub mod shell;
pub mod tensor;
pub mod term;

pub use boost::{generate_term_update, ILLEGAL_GAIN};
pub use error::BoostError;
pub use flags::{MonotoneDirection, TermBoostFlags};
pub use rng::SplitRng;
pub use shell::{BoosterConfig, BoosterCore, BoosterCoreBuilder, BoosterShell};
pub use tensor::UpdateTensor;
pub use term::{Feature, Term};
