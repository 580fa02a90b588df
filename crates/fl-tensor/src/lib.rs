// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of Flatland — Licensed under AGPL-3.0-or-later.

//! Dense 2-D tensor primitives with only lightweight external dependencies.
//!
//! The flatness estimator never backpropagates, so this crate deliberately
//! offers no autograd, no layouts beyond row-major and no accelerator
//! backends — just an owned `f32` buffer with shape metadata, the p-norm and
//! top-k primitives the estimator needs, and seeded random constructors so
//! every draw stays reproducible.

pub mod dense;
pub mod norm;

pub use self::dense::{Device, PureResult, Tensor, TensorError};
pub use self::norm::{topk, Norm};
