//! Typed views and scratch allocation over engine linear memory.
//!
//! Two pieces sit directly on top of [`LinearMemory`]:
//!
//! ```text
//! LinearMemory (engine bytes)
//! ├── TypedView / TypedViewMut   fixed-width element access (u8, u32, f64)
//! └── ScratchStack               bump allocator over a reserved sub-region
//!     └── ScratchFrame           save on creation, restore on drop
//! ```
//!
//! Views borrow the memory, so a view taken before the memory grows
//! cannot be used afterwards. Re-derive a view (via [`MemoryExt`]) for
//! every access instead of storing one.
//!
//! [`LinearMemory`]: membrane_core::LinearMemory

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod scratch;
pub mod view;

pub use scratch::{Checkpoint, ScratchFrame, ScratchStack, MAX_ALIGN};
pub use view::{Element, MemoryExt, TypedView, TypedViewMut};
