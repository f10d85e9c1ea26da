//! Kernel set lifecycle.

use membrane_core::{ArgumentError, BridgeError, EngineBinding, EngineError, HandleKind};
use membrane_marshal::put_strings;
use tracing::{debug, instrument};

use crate::id::KernelSetId;
use crate::session::{KernelSetRecord, Session};

impl<B: EngineBinding> Session<B> {
    /// Build a kernel set from kernel names such as `"sum"` or `"mul"`.
    ///
    /// The engine decides which names it knows; an unknown name makes it
    /// return a null handle, reported as [`EngineError::NullHandle`].
    #[instrument(level = "trace", skip_all, fields(count = names.len()))]
    pub fn create_kernel_set<S: AsRef<str>>(&mut self, names: &[S]) -> Result<KernelSetId, BridgeError> {
        if names.is_empty() {
            return Err(ArgumentError::Empty {
                what: "kernel names",
            }
            .into());
        }
        let count = u32::try_from(names.len()).map_err(|_| ArgumentError::TooLarge {
            what: "kernel names",
            len: names.len(),
        })?;
        let raw = self.with_scratch(|scratch, engine| {
            let at = put_strings(scratch, engine, names)?;
            Ok(engine.kernel_set_construct(at, count)?)
        })?;
        if raw.is_null() {
            return Err(EngineError::NullHandle {
                entry_point: "kernel_set_construct",
            }
            .into());
        }
        let names = names.iter().map(|n| n.as_ref().to_owned()).collect();
        let id = KernelSetId(self.kernel_sets.insert(KernelSetRecord { raw, names }));
        debug!(kernel_set = %id, raw = %raw, "created kernel set");
        Ok(id)
    }

    /// Destroy a kernel set.
    ///
    /// The engine's destroy entry point runs at most once per kernel set:
    /// the ID is retired before the call, even if the engine then fails.
    /// Destroying again is rejected with [`BridgeError::InvalidState`].
    /// Expressions built from the set stay usable.
    #[instrument(level = "trace", skip_all, fields(kernel_set = %id))]
    pub fn destroy_kernel_set(&mut self, id: KernelSetId) -> Result<(), BridgeError> {
        let record = self.kernel_sets.remove(id.0).ok_or(BridgeError::InvalidState {
            kind: HandleKind::KernelSet,
            handle: id.0,
        })?;
        self.engine.kernel_set_destroy(record.raw)?;
        debug!(kernel_set = %id, raw = %record.raw, "destroyed kernel set");
        Ok(())
    }

    /// The names the kernel set was built from.
    pub fn kernel_set_names(&self, id: KernelSetId) -> Result<&[String], BridgeError> {
        Ok(self.kernel_set(id)?.names.as_slice())
    }
}
