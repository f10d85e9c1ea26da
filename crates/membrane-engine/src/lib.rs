//! Engine object lifetimes and the public session operations.
//!
//! A [`Session`] owns one [`EngineBinding`](membrane_core::EngineBinding),
//! the scratch stack reserved from it, and generation-checked tables of
//! the kernel sets and expressions it created. Host code refers to engine
//! objects only through [`KernelSetId`] and [`ExpressionId`]; once an
//! object is destroyed its ID fails every operation with
//! [`BridgeError::InvalidState`](membrane_core::BridgeError::InvalidState)
//! before any memory is touched.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod algorithms;
pub mod config;
mod expression;
mod handle;
mod id;
mod kernel_set;
mod session;

pub use algorithms::GradientDescentOutcome;
pub use config::SessionConfig;
pub use handle::HandleState;
pub use id::{ExpressionId, KernelSetId};
pub use session::Session;
