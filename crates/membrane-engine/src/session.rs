//! The session: one engine binding, its scratch stack and its handles.

use membrane_core::{BridgeError, EngineBinding, ExpressionParams, HandleKind, RawHandle};
use membrane_memory::ScratchStack;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::handle::{HandleState, HandleTable};
use crate::id::{ExpressionId, KernelSetId};

pub(crate) struct KernelSetRecord {
    pub(crate) raw: RawHandle,
    pub(crate) names: Vec<String>,
}

pub(crate) struct ExpressionRecord {
    pub(crate) raw: RawHandle,
    pub(crate) params: ExpressionParams,
}

/// Exclusive owner of an engine binding.
///
/// Every operation takes `&mut self`, so call sequences on one session
/// can never interleave; share a session across threads behind a `Mutex`.
/// Each operation checks handle liveness, validates its arguments, then
/// opens a scratch frame for the engine call. The frame is restored and
/// every engine-heap result buffer freed before the operation returns,
/// on success and on error alike.
///
/// Dropping the session destroys every kernel set and expression still
/// live, once each.
pub struct Session<B: EngineBinding> {
    pub(crate) engine: B,
    pub(crate) scratch: ScratchStack,
    config: SessionConfig,
    pub(crate) kernel_sets: HandleTable<KernelSetRecord>,
    pub(crate) expressions: HandleTable<ExpressionRecord>,
}

impl<B: EngineBinding> Session<B> {
    /// Validate `config` and reserve the scratch region from `engine`.
    pub fn new(mut engine: B, config: SessionConfig) -> Result<Self, BridgeError> {
        config.validate()?;
        let base = engine.reserve_scratch(config.scratch_bytes)?;
        let scratch = ScratchStack::new(base, config.scratch_bytes, config.scratch_align)?;
        debug!(
            base = %base,
            bytes = config.scratch_bytes,
            align = config.scratch_align,
            "session scratch reserved"
        );
        Ok(Self {
            engine,
            scratch,
            config,
            kernel_sets: HandleTable::new(),
            expressions: HandleTable::new(),
        })
    }

    /// The underlying engine binding.
    pub fn engine(&self) -> &B {
        &self.engine
    }

    /// The scratch stack, for inspecting usage.
    pub fn scratch(&self) -> &ScratchStack {
        &self.scratch
    }

    /// The configuration this session was created with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of live kernel sets.
    pub fn live_kernel_sets(&self) -> usize {
        self.kernel_sets.len()
    }

    /// Number of live expressions.
    pub fn live_expressions(&self) -> usize {
        self.expressions.len()
    }

    /// Lifecycle state of a kernel set, or `None` for an ID this session
    /// never issued.
    pub fn kernel_set_state(&self, id: KernelSetId) -> Option<HandleState> {
        self.kernel_sets.state(id.0)
    }

    /// Lifecycle state of an expression, or `None` for an ID this session
    /// never issued.
    pub fn expression_state(&self, id: ExpressionId) -> Option<HandleState> {
        self.expressions.state(id.0)
    }

    pub(crate) fn kernel_set(&self, id: KernelSetId) -> Result<&KernelSetRecord, BridgeError> {
        self.kernel_sets.get(id.0).ok_or(BridgeError::InvalidState {
            kind: HandleKind::KernelSet,
            handle: id.0,
        })
    }

    pub(crate) fn expression(&self, id: ExpressionId) -> Result<&ExpressionRecord, BridgeError> {
        self.expressions.get(id.0).ok_or(BridgeError::InvalidState {
            kind: HandleKind::Expression,
            handle: id.0,
        })
    }

    /// Run `f` inside a scratch frame that is restored when it returns.
    pub(crate) fn with_scratch<R>(
        &mut self,
        f: impl FnOnce(&mut ScratchStack, &mut B) -> Result<R, BridgeError>,
    ) -> Result<R, BridgeError> {
        let mut frame = self.scratch.frame();
        f(&mut *frame, &mut self.engine)
    }
}

impl<B: EngineBinding> Drop for Session<B> {
    fn drop(&mut self) {
        let expressions = self.expressions.drain();
        let kernel_sets = self.kernel_sets.drain();
        if expressions.is_empty() && kernel_sets.is_empty() {
            return;
        }
        warn!(
            expressions = expressions.len(),
            kernel_sets = kernel_sets.len(),
            "session dropped with live handles; destroying them"
        );
        for (key, record) in expressions {
            let id = ExpressionId(key);
            match self.engine.expression_destroy(record.raw) {
                Ok(()) => debug!(expression = %id, raw = %record.raw, "destroyed expression"),
                Err(e) => warn!(expression = %id, error = %e, "failed to destroy expression"),
            }
        }
        for (key, record) in kernel_sets {
            let id = KernelSetId(key);
            match self.engine.kernel_set_destroy(record.raw) {
                Ok(()) => debug!(kernel_set = %id, raw = %record.raw, "destroyed kernel set"),
                Err(e) => warn!(kernel_set = %id, error = %e, "failed to destroy kernel set"),
            }
        }
    }
}
