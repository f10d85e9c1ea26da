//! Membrane: a host-side bridge to an expression engine that lives in
//! WebAssembly linear memory.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all membrane sub-crates. For most users, adding `membrane` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use membrane::prelude::*;
//! use membrane_test_utils::MockEngine;
//!
//! // Any EngineBinding works here; a compiled engine module would use
//! // `WasmEngine::from_bytes` instead of the in-process mock.
//! let mut session = Session::new(MockEngine::new(), SessionConfig::default()).unwrap();
//! let kernels = session.create_kernel_set(&["sum", "mul"]).unwrap();
//! let expr = session
//!     .create_expression(ExpressionParams::new(2, 1).with_seed(7), kernels)
//!     .unwrap();
//!
//! // One point in, one value per output out.
//! let point = session.evaluate(expr, &[1.0, 2.0]).unwrap();
//! assert_eq!(point.into_point().unwrap().len(), 1);
//!
//! // Rows are inputs, columns are points; results come back one row per output.
//! let batch = session
//!     .evaluate(expr, &[vec![0.0, 1.0, 2.0], vec![3.0, 4.0, 5.0]])
//!     .unwrap();
//! assert_eq!(batch.into_batch().unwrap()[0].len(), 3);
//!
//! session.destroy_expression(expr).unwrap();
//! let err = session.evaluate(expr, &[1.0, 2.0]).unwrap_err();
//! assert_eq!(err.code(), ErrorCode::InvalidState);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `membrane-core` | Addresses, handles, parameters, errors, the binding traits |
//! | [`memory`] | `membrane-memory` | Typed views and the scratch stack |
//! | [`marshal`] | `membrane-marshal` | Matrix layout, batched evaluation, string records |
//! | [`engine`] | `membrane-engine` | Sessions and handle lifecycle |
//! | [`wasm`] | `membrane-wasm` | The wasmtime backend |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and errors (`membrane-core`).
///
/// Contains [`types::Address`], [`types::RawHandle`], the
/// [`types::LinearMemory`] and [`types::EngineBinding`] traits, and the
/// error taxonomy rooted at [`types::BridgeError`].
pub use membrane_core as types;

/// Typed views and scratch allocation (`membrane-memory`).
pub use membrane_memory as memory;

/// Host/engine data conversion (`membrane-marshal`).
///
/// Most users never call these directly; [`engine::Session`] does.
pub use membrane_marshal as marshal;

/// Sessions and handle lifecycle (`membrane-engine`).
pub use membrane_engine as engine;

/// The wasmtime-backed engine binding (`membrane-wasm`).
pub use membrane_wasm as wasm;

/// Common imports for typical membrane usage.
///
/// ```rust
/// use membrane::prelude::*;
/// ```
pub mod prelude {
    // Session and IDs
    pub use membrane_engine::{
        ExpressionId, GradientDescentOutcome, HandleState, KernelSetId, Session, SessionConfig,
    };

    // Parameters and traits
    pub use membrane_core::{EngineBinding, ExpressionParams, LinearMemory};

    // Errors
    pub use membrane_core::{ArgumentError, BridgeError, EngineError, ErrorCode};

    // Evaluation shapes
    pub use membrane_marshal::{Evaluation, EvaluationInput};

    // Backend
    pub use membrane_wasm::WasmEngine;
}
