//! Test utilities for membrane development.
//!
//! [`MockEngine`] implements [`EngineBinding`](membrane_core::EngineBinding)
//! over a plain byte vector with its own heap, so marshaling and session
//! logic can be tested without a wasm runtime. [`fixtures`] holds the
//! kernel names and data sets shared by the test suites.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
mod mock;

pub use mock::{BlockKind, MockEngine, DEFAULT_MAX_PAGES, HEAP_START};
