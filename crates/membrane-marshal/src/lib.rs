//! Marshaling between host-native data and engine buffers.
//!
//! - [`array`]: matrix layout adapters (`flatten`, `transpose`), the
//!   point-major input layout used by evaluation, and the batched
//!   evaluation driver that copies out and frees every result buffer.
//! - [`string`]: the engine's length-framed string records.
//!
//! Functions that touch memory take the scratch stack and the engine
//! explicitly; nothing here holds global state.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod array;
pub mod string;

pub use array::{
    calculate_evaluation, ensure_rectangular, flatten, put_array, read_array,
    structure_evaluation_inputs, transpose, Evaluation, EvaluationInput,
};
pub use string::{decode_records, decode_strings, encode_strings, put_strings};
