//! String marshalling across the guest's linear memory boundary.
//!
//! The guest engine exposes a numeric-only ABI; strings cross the
//! boundary as `(pointer, length)` pairs into linear memory. Offsets
//! always originate from the sandboxed guest and are never trusted:
//! every read is bounds-checked against the current memory size before
//! any byte is touched.
//!
//! # Ownership
//!
//! Buffers produced by [`encode_string`] and returned by the evaluation
//! export are guest-owned. The host invokes the guest `js_free` export
//! after use; if the guest does not export one, memory grows
//! monotonically and the limitation is logged once per process.

use std::sync::Once;

use tracing::warn;
use wasmtime::{AsContext, Instance, Memory, Store, TypedFunc};

use script_host_common::ScriptHostError;

use crate::state::HostState;

/// Guest export: linear memory.
pub const EXPORT_MEMORY: &str = "memory";
/// Guest export: evaluation entry point, `(ptr, len) -> packed`.
pub const EXPORT_EVAL: &str = "js_eval";
/// Guest export: allocator, `(len) -> ptr`. Optional.
pub const EXPORT_ALLOC: &str = "js_alloc";
/// Guest export: deallocator, `(ptr, len)`. Optional.
pub const EXPORT_FREE: &str = "js_free";

const WASM_PAGE_SIZE: usize = 65536;

static MISSING_FREE_WARNING: Once = Once::new();

/// Resolved guest exports needed for marshalling and evaluation.
///
/// Fixed at instantiation time; `js_alloc`/`js_free` are optional, the
/// memory and the evaluation export are mandatory.
pub struct GuestAbi {
    /// The guest's linear memory.
    pub memory: Memory,
    /// Evaluation entry point.
    pub eval: TypedFunc<(i32, i32), i64>,
    /// Guest allocator, if exported.
    pub alloc: Option<TypedFunc<i32, i32>>,
    /// Guest deallocator, if exported.
    pub free: Option<TypedFunc<(i32, i32), ()>>,
}

impl GuestAbi {
    /// Resolve the ABI from a live instance.
    ///
    /// # Errors
    ///
    /// Fails with `Init` when the memory or the evaluation export is
    /// missing or has the wrong signature.
    pub fn resolve(
        store: &mut Store<HostState>,
        instance: &Instance,
    ) -> Result<Self, ScriptHostError> {
        let memory = instance
            .get_memory(&mut *store, EXPORT_MEMORY)
            .ok_or_else(|| {
                ScriptHostError::init(format!("Guest does not export '{EXPORT_MEMORY}'"))
            })?;

        let eval = instance
            .get_typed_func::<(i32, i32), i64>(&mut *store, EXPORT_EVAL)
            .map_err(|e| {
                ScriptHostError::init(format!("Guest export '{EXPORT_EVAL}' unusable: {e}"))
            })?;

        let alloc = instance
            .get_typed_func::<i32, i32>(&mut *store, EXPORT_ALLOC)
            .ok();
        let free = instance
            .get_typed_func::<(i32, i32), ()>(&mut *store, EXPORT_FREE)
            .ok();

        Ok(Self {
            memory,
            eval,
            alloc,
            free,
        })
    }
}

/// Copy a UTF-8 string into guest memory via the guest allocator.
///
/// Returns the `(pointer, length)` of the written region. Grows linear
/// memory when the allocator hands back a region past the current size
/// and the module permits growth.
///
/// # Errors
///
/// Fails with `Allocation` when no allocator is exported, the guest
/// returns a null pointer, or growth fails; with `MemoryAccess` when
/// the write is rejected.
pub async fn encode_string(
    store: &mut Store<HostState>,
    abi: &GuestAbi,
    text: &str,
) -> Result<(u32, u32), ScriptHostError> {
    let alloc = abi.alloc.as_ref().ok_or_else(|| {
        ScriptHostError::allocation(format!("Guest does not export '{EXPORT_ALLOC}'"))
    })?;

    let bytes = text.as_bytes();
    let len =
        u32::try_from(bytes.len()).map_err(|_| ScriptHostError::allocation("Input too large"))?;

    // Allocate at least one byte so a zero-length input still gets a
    // distinguishable region.
    let request = len.max(1);
    let ptr = alloc
        .call_async(&mut *store, request as i32)
        .await
        .map_err(|e| ScriptHostError::allocation(format!("Guest allocator trapped: {e}")))?;

    if ptr == 0 {
        return Err(ScriptHostError::allocation(format!(
            "Guest allocator returned null for {request} bytes"
        )));
    }

    let ptr = ptr as u32;
    let end = ptr as usize + bytes.len();
    let size = abi.memory.data_size(&*store);

    if end > size {
        let deficit = end - size;
        let pages = deficit.div_ceil(WASM_PAGE_SIZE) as u64;
        abi.memory.grow(&mut *store, pages).map_err(|e| {
            ScriptHostError::allocation(format!("Memory growth by {pages} pages failed: {e}"))
        })?;
    }

    abi.memory
        .write(&mut *store, ptr as usize, bytes)
        .map_err(|_| ScriptHostError::MemoryAccess {
            offset: u64::from(ptr),
            len: u64::from(len),
            memory_size: abi.memory.data_size(&*store) as u64,
        })?;

    Ok((ptr, len))
}

/// Copy raw bytes out of guest memory, bounds-checking first.
///
/// # Errors
///
/// Fails with `MemoryAccess` when `ptr + len` exceeds the current
/// linear memory size or overflows.
pub fn read_bytes(
    ctx: impl AsContext,
    memory: &Memory,
    ptr: u32,
    len: u32,
) -> Result<Vec<u8>, ScriptHostError> {
    let data = memory.data(&ctx);
    let start = ptr as usize;

    let out_of_bounds = || ScriptHostError::MemoryAccess {
        offset: u64::from(ptr),
        len: u64::from(len),
        memory_size: data.len() as u64,
    };

    let end = start.checked_add(len as usize).ok_or_else(out_of_bounds)?;
    if end > data.len() {
        return Err(out_of_bounds());
    }

    Ok(data[start..end].to_vec())
}

/// Copy a string out of guest memory, validating bounds and UTF-8.
///
/// # Errors
///
/// Fails with `MemoryAccess` on a bounds violation and `Encoding` on
/// invalid UTF-8.
pub fn decode_string(
    ctx: impl AsContext,
    memory: &Memory,
    ptr: u32,
    len: u32,
) -> Result<String, ScriptHostError> {
    let bytes = read_bytes(ctx, memory, ptr, len)?;
    String::from_utf8(bytes)
        .map_err(|e| ScriptHostError::encoding(format!("Guest string is not UTF-8: {e}")))
}

/// Return a guest-owned buffer to the guest allocator.
///
/// When the guest exports no `js_free`, the buffer is leaked inside the
/// guest and memory grows monotonically; this is logged once per
/// process rather than silently ignored.
pub async fn release_string(
    store: &mut Store<HostState>,
    abi: &GuestAbi,
    ptr: u32,
    len: u32,
) -> Result<(), ScriptHostError> {
    match &abi.free {
        Some(free) => free
            .call_async(&mut *store, (ptr as i32, len.max(1) as i32))
            .await
            .map_err(|e| {
                ScriptHostError::allocation(format!("Guest deallocator trapped: {e}"))
            }),
        None => {
            MISSING_FREE_WARNING.call_once(|| {
                warn!(
                    "Guest exports no '{EXPORT_FREE}'; guest memory will grow monotonically"
                );
            });
            Ok(())
        }
    }
}

/// Split the packed `js_eval` return into `(pointer, length)`.
///
/// Returns `None` when the guest signalled result-allocation failure
/// with a null pointer.
pub fn unpack_eval_result(packed: i64) -> Option<(u32, u32)> {
    let raw = packed as u64;
    let ptr = (raw >> 32) as u32;
    let len = raw as u32;

    if ptr == 0 { None } else { Some((ptr, len)) }
}

/// Decoded content of an evaluation result buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalOutput {
    /// The script produced a value, rendered as text.
    Value(String),
    /// The script raised an uncaught guest-level exception.
    ScriptError(String),
}

/// Decode the evaluation result buffer: one status byte (`0` value,
/// `1` script exception) followed by a UTF-8 payload.
///
/// # Errors
///
/// Fails with `MemoryAccess` on a bounds violation, `Encoding` on an
/// empty buffer, an unknown status tag, or invalid UTF-8.
pub fn decode_eval_buffer(
    ctx: impl AsContext,
    memory: &Memory,
    ptr: u32,
    len: u32,
) -> Result<EvalOutput, ScriptHostError> {
    let bytes = read_bytes(ctx, memory, ptr, len)?;

    let (status, payload) = bytes
        .split_first()
        .ok_or_else(|| ScriptHostError::encoding("Empty evaluation result buffer"))?;

    let text = std::str::from_utf8(payload)
        .map_err(|e| ScriptHostError::encoding(format!("Result payload is not UTF-8: {e}")))?
        .to_string();

    match status {
        0 => Ok(EvalOutput::Value(text)),
        1 => Ok(EvalOutput::ScriptError(text)),
        other => Err(ScriptHostError::encoding(format!(
            "Unknown result status tag {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompiledModule, WasmEngine};
    use script_host_common::EngineConfig;
    use wasmtime::Linker;

    // Guest with a bump allocator and an exported memory, enough to
    // exercise encode/decode against real linear memory.
    const ALLOC_GUEST: &str = r#"
        (module
            (memory (export "memory") 1)
            (global $next (mut i32) (i32.const 8))
            (func (export "js_alloc") (param $n i32) (result i32)
                (local $p i32)
                (local.set $p (global.get $next))
                (global.set $next (i32.add (global.get $next) (local.get $n)))
                (local.get $p))
            (func (export "js_free") (param i32 i32))
            (func (export "js_eval") (param i32 i32) (result i64)
                (i64.const 0))
        )
    "#;

    async fn instantiate(wat: &str) -> (Store<HostState>, GuestAbi) {
        let engine = WasmEngine::new(&EngineConfig {
            epoch_interruption: false,
            ..Default::default()
        })
        .unwrap();
        let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
        let linker = Linker::new(engine.inner());
        let mut store = Store::new(engine.inner(), HostState::new());
        let instance = linker
            .instantiate_async(&mut store, module.as_module())
            .await
            .unwrap();
        let abi = GuestAbi::resolve(&mut store, &instance).unwrap();
        (store, abi)
    }

    #[tokio::test]
    async fn test_string_round_trip() {
        let (mut store, abi) = instantiate(ALLOC_GUEST).await;

        for text in ["hello", "", "héllo wörld", "日本語のテキスト", "🎉"] {
            let (ptr, len) = encode_string(&mut store, &abi, text).await.unwrap();
            let back = decode_string(&store, &abi.memory, ptr, len).unwrap();
            assert_eq!(back, text);
            release_string(&mut store, &abi, ptr, len).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_decode_out_of_bounds() {
        let (store, abi) = instantiate(ALLOC_GUEST).await;

        // One page of memory; read past the end must be rejected
        let result = decode_string(&store, &abi.memory, 65530, 100);
        assert!(matches!(result, Err(ScriptHostError::MemoryAccess { .. })));

        // Overflow of ptr + len must be rejected, not wrapped
        let result = decode_string(&store, &abi.memory, u32::MAX, u32::MAX);
        assert!(matches!(result, Err(ScriptHostError::MemoryAccess { .. })));
    }

    #[tokio::test]
    async fn test_decode_invalid_utf8() {
        let (mut store, abi) = instantiate(ALLOC_GUEST).await;

        abi.memory.write(&mut store, 8, &[0xff, 0xfe]).unwrap();
        let result = decode_string(&store, &abi.memory, 8, 2);
        assert!(matches!(result, Err(ScriptHostError::Encoding { .. })));
    }

    #[tokio::test]
    async fn test_encode_grows_memory() {
        let (mut store, abi) = instantiate(ALLOC_GUEST).await;

        // Larger than the single initial page
        let big = "x".repeat(2 * WASM_PAGE_SIZE);
        let (ptr, len) = encode_string(&mut store, &abi, &big).await.unwrap();
        let back = decode_string(&store, &abi.memory, ptr, len).unwrap();
        assert_eq!(back.len(), big.len());
    }

    #[tokio::test]
    async fn test_encode_without_allocator() {
        const NO_ALLOC: &str = r#"
            (module
                (memory (export "memory") 1)
                (func (export "js_eval") (param i32 i32) (result i64)
                    (i64.const 0))
            )
        "#;
        let (mut store, abi) = instantiate(NO_ALLOC).await;

        let result = encode_string(&mut store, &abi, "hi").await;
        assert!(matches!(result, Err(ScriptHostError::Allocation { .. })));

        // Missing js_free is tolerated
        release_string(&mut store, &abi, 8, 2).await.unwrap();
    }

    #[test]
    fn test_unpack_eval_result() {
        assert_eq!(unpack_eval_result(0), None);
        assert_eq!(unpack_eval_result((16_i64 << 32) | 5), Some((16, 5)));
        assert_eq!(unpack_eval_result(42), None); // null ptr, nonzero len
    }

    #[tokio::test]
    async fn test_decode_eval_buffer_status_tags() {
        let (mut store, abi) = instantiate(ALLOC_GUEST).await;

        abi.memory.write(&mut store, 8, b"\x0042").unwrap();
        assert_eq!(
            decode_eval_buffer(&store, &abi.memory, 8, 3).unwrap(),
            EvalOutput::Value("42".into())
        );

        abi.memory.write(&mut store, 16, b"\x01boom").unwrap();
        assert_eq!(
            decode_eval_buffer(&store, &abi.memory, 16, 5).unwrap(),
            EvalOutput::ScriptError("boom".into())
        );

        abi.memory.write(&mut store, 24, b"\x07x").unwrap();
        assert!(decode_eval_buffer(&store, &abi.memory, 24, 2).is_err());

        assert!(decode_eval_buffer(&store, &abi.memory, 8, 0).is_err());
    }
}
