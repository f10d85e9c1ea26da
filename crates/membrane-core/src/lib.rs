//! Core types and traits for the membrane host/engine bridge.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by every other crate in the workspace:
//! linear-memory addresses, raw engine handles, the [`LinearMemory`]
//! and [`EngineBinding`] traits, and the error taxonomy.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod address;
pub mod error;
pub mod params;
pub mod traits;

pub use address::{Address, RawHandle};
pub use error::{
    ArgumentError, BridgeError, ConfigError, EngineError, ErrorCode, HandleKind, MemoryError,
};
pub use params::{ExpressionParams, LossArgs};
pub use traits::{EngineBinding, LinearMemory, PAGE_SIZE};
