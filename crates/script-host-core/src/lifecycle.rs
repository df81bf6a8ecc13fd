//! Engine lifecycle management.
//!
//! [`EngineHost`] owns the virtual machine and everything hanging off
//! it: the compiled guest module, the single long-lived store, the live
//! instance, and the resolved guest ABI. It exposes:
//!
//! - `init()` / `teardown()` / `is_ready()`: idempotent lifecycle
//! - `eval()`: one serialized script evaluation against the live
//!   instance
//!
//! The host is not safe for concurrent use; the execution serializer's
//! worker is its only owner. A failed `init()` retains no partial
//! state, and `teardown()` releases instance, store, and module in
//! reverse creation order (the engine itself lives for the whole
//! process).

use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};
use wasmtime::{Linker, Store, Trap};

use script_host_common::{EngineConfig, ScriptHostError};

use crate::WasmEngine;
use crate::assets::AssetStore;
use crate::memory::{
    EvalOutput, GuestAbi, decode_eval_buffer, encode_string, release_string, unpack_eval_result,
};
use crate::module::CompiledModule;
use crate::state::HostState;

/// Epoch deadline applied while no evaluation is running, so host
/// bookkeeping (instantiation, allocator calls between requests) is
/// never interrupted.
const IDLE_EPOCH_DEADLINE: u64 = u64::MAX / 2;

/// Everything that exists only while the host is ready.
///
/// Field order matters: dropping this struct releases the ABI handles,
/// then the store (which owns the instance), then the module.
struct LiveInstance {
    abi: GuestAbi,
    store: Store<HostState>,
    module: CompiledModule,
}

/// Owner of the sandboxed engine and its single live instance.
pub struct EngineHost {
    engine: WasmEngine,
    linker: Linker<HostState>,
    assets: AssetStore,
    live: Option<LiveInstance>,
    last_init_error: Option<String>,
}

impl EngineHost {
    /// Create a host around a fresh engine.
    ///
    /// Bindings must be installed on [`linker_mut`](Self::linker_mut)
    /// before the first `init()`; linking happens inside `init()`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be created.
    pub fn new(config: &EngineConfig, assets: AssetStore) -> Result<Self, ScriptHostError> {
        let engine = WasmEngine::new(config)?;
        let linker = Linker::new(engine.inner());

        Ok(Self {
            engine,
            linker,
            assets,
            live: None,
            last_init_error: None,
        })
    }

    /// The underlying engine handle (cheap to clone; used by the epoch
    /// ticker).
    pub fn engine(&self) -> &WasmEngine {
        &self.engine
    }

    /// Mutable access to the linker for host-binding installation.
    pub fn linker_mut(&mut self) -> &mut Linker<HostState> {
        &mut self.linker
    }

    /// True iff a live instance exists.
    pub fn is_ready(&self) -> bool {
        self.live.is_some()
    }

    /// The reason the last `init()` failed, if it did.
    pub fn last_init_error(&self) -> Option<&str> {
        self.last_init_error.as_deref()
    }

    /// Build the live instance: load asset bytes, compile, link,
    /// instantiate into a fresh store, resolve the guest ABI.
    ///
    /// Idempotent: a ready host returns immediately. On failure no
    /// partial instance is retained and readiness stays false.
    ///
    /// # Errors
    ///
    /// Fails with `Init` on a missing/corrupt asset, compile failure,
    /// missing import during linking, or missing guest export.
    #[instrument(skip(self))]
    pub async fn init(&mut self) -> Result<(), ScriptHostError> {
        if self.live.is_some() {
            debug!("init() called while ready; no-op");
            return Ok(());
        }

        let start = Instant::now();
        let asset = self.engine.config().module_asset.clone();

        match self.build_live(&asset).await {
            Ok(live) => {
                info!(
                    asset = %asset,
                    content_hash = live.module.content_hash(),
                    duration_ms = start.elapsed().as_millis(),
                    "Engine initialized"
                );
                self.live = Some(live);
                self.last_init_error = None;
                Ok(())
            }
            Err(e) => {
                error!(asset = %asset, error = %e, "Engine initialization failed");
                self.last_init_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn build_live(&mut self, asset: &str) -> Result<LiveInstance, ScriptHostError> {
        let bytes = self
            .assets
            .load(asset)
            .map_err(|e| ScriptHostError::init(format!("Failed to load asset '{asset}': {e}")))?;

        let module = CompiledModule::from_bytes(self.engine.inner(), &bytes)?;

        let mut store = Store::new(self.engine.inner(), HostState::new());
        if self.engine.epoch_interruption() {
            store.set_epoch_deadline(IDLE_EPOCH_DEADLINE);
        }

        let instance = self
            .linker
            .instantiate_async(&mut store, module.as_module())
            .await
            .map_err(|e| ScriptHostError::init(format!("Instantiation failed: {e}")))?;

        let abi = GuestAbi::resolve(&mut store, &instance)?;

        Ok(LiveInstance { abi, store, module })
    }

    /// Release the live instance. Idempotent; safe when already
    /// uninitialized.
    pub fn teardown(&mut self) {
        if let Some(live) = self.live.take() {
            drop(live);
            info!("Engine torn down");
        }
    }

    /// Tear down and immediately rebuild the instance.
    ///
    /// Used after a fatal trap or timeout, before the next request is
    /// served.
    ///
    /// # Errors
    ///
    /// Fails with `Init` when the rebuild fails; the host is then not
    /// ready until a later `init()` succeeds.
    pub async fn reinit(&mut self) -> Result<(), ScriptHostError> {
        warn!("Reinitializing engine after fatal failure");
        self.teardown();
        self.init().await
    }

    /// Evaluate one script against the live instance.
    ///
    /// Encodes the source into guest memory, invokes the evaluation
    /// export under the given epoch deadline, decodes the result
    /// buffer, and returns the produced value.
    ///
    /// # Errors
    ///
    /// - `NotReady` when no live instance exists
    /// - `Allocation` / `MemoryAccess` / `Encoding` on marshalling
    ///   failures
    /// - `Script` when the guest reports an uncaught script exception
    /// - `Timeout` when the epoch deadline interrupts the call
    /// - `Trap` (fatal or not) on any other VM fault
    #[instrument(skip(self, source), fields(request_id = %request_id, source_len = source.len()))]
    pub async fn eval(
        &mut self,
        request_id: &str,
        source: &str,
        timeout_ms: u64,
    ) -> Result<String, ScriptHostError> {
        let epoch_interruption = self.engine.epoch_interruption();
        let live = self.live.as_mut().ok_or_else(|| {
            ScriptHostError::not_ready(
                self.last_init_error
                    .clone()
                    .unwrap_or_else(|| "Engine not initialized".to_string()),
            )
        })?;

        live.store.data_mut().begin_request(request_id);
        let result = Self::eval_inner(live, source, timeout_ms, epoch_interruption).await;
        live.store.data_mut().end_request();

        result
    }

    async fn eval_inner(
        live: &mut LiveInstance,
        source: &str,
        timeout_ms: u64,
        epoch_interruption: bool,
    ) -> Result<String, ScriptHostError> {
        let (in_ptr, in_len) = encode_string(&mut live.store, &live.abi, source).await?;

        // Deadline covers only the evaluation call itself; the ticker
        // increments the epoch once per millisecond.
        if epoch_interruption {
            live.store.set_epoch_deadline(timeout_ms.max(1));
        }

        let called = live
            .abi
            .eval
            .call_async(&mut live.store, (in_ptr as i32, in_len as i32))
            .await;

        if epoch_interruption {
            live.store.set_epoch_deadline(IDLE_EPOCH_DEADLINE);
        }

        // Input buffer is guest-owned; hand it back regardless of the
        // call result. A trapped instance may refuse, which only means
        // the bytes leak until the next teardown.
        if let Err(e) = release_string(&mut live.store, &live.abi, in_ptr, in_len).await {
            debug!(error = %e, "Failed to release input buffer");
        }

        let packed = match called {
            Ok(packed) => packed,
            Err(trap) => return Err(map_call_error(trap, timeout_ms)),
        };

        let (out_ptr, out_len) = unpack_eval_result(packed).ok_or_else(|| {
            ScriptHostError::allocation("Guest could not allocate a result buffer")
        })?;

        let output = decode_eval_buffer(&live.store, &live.abi.memory, out_ptr, out_len);

        if let Err(e) = release_string(&mut live.store, &live.abi, out_ptr, out_len).await {
            debug!(error = %e, "Failed to release result buffer");
        }

        match output? {
            EvalOutput::Value(value) => Ok(value),
            EvalOutput::ScriptError(message) => Err(ScriptHostError::script(message)),
        }
    }
}

impl std::fmt::Debug for EngineHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHost")
            .field("ready", &self.is_ready())
            .field("last_init_error", &self.last_init_error)
            .finish_non_exhaustive()
    }
}

/// Map a failed evaluation call to the host taxonomy.
///
/// A host binding that rejected a guest access propagates its own
/// `ScriptHostError` through the trap; an epoch interrupt becomes
/// `Timeout`; everything else is a VM trap, classified fatal or not.
fn map_call_error(error: wasmtime::Error, timeout_ms: u64) -> ScriptHostError {
    let error = match error.downcast::<ScriptHostError>() {
        Ok(host_error) => return host_error,
        Err(error) => error,
    };

    if let Some(trap) = error.downcast_ref::<Trap>() {
        if *trap == Trap::Interrupt {
            return ScriptHostError::Timeout {
                limit_ms: timeout_ms,
            };
        }

        return ScriptHostError::Trap {
            message: error.to_string(),
            code: Some(format!("{trap:?}")),
            fatal: is_fatal_trap(*trap),
        };
    }

    ScriptHostError::Trap {
        message: error.to_string(),
        code: None,
        fatal: false,
    }
}

/// Traps that suggest guest memory or VM-state corruption force a
/// teardown and reinit before the next request is served.
fn is_fatal_trap(trap: Trap) -> bool {
    matches!(
        trap,
        Trap::MemoryOutOfBounds
            | Trap::TableOutOfBounds
            | Trap::IndirectCallToNull
            | Trap::BadSignature
            | Trap::HeapMisaligned
    )
}
