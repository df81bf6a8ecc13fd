//! The guest logging binding.
//!
//! `env::js_print(ptr, len)` is the one binding every guest build
//! imports. The pointer and length originate from the sandboxed guest
//! and are attacker-influenced; they are validated against the current
//! linear-memory size before any byte is read, and a violation traps
//! the guest call with a `MemoryAccess` error instead of reading out
//! of bounds.

use tracing::info;
use wasmtime::{Caller, Extern, Linker};

use script_host_common::ScriptHostError;
use script_host_core::HostState;
use script_host_core::memory::{EXPORT_MEMORY, decode_string};

use crate::registry::{BindingSignature, HostBindingRegistry, NumType};

/// Import namespace all host bindings live under.
pub const IMPORT_NAMESPACE: &str = "env";
/// Name of the logging binding.
pub const IMPORT_PRINT: &str = "js_print";

/// Register the logging binding on a registry.
///
/// # Errors
///
/// Fails when the registry is frozen or the binding already exists.
pub fn register_print(registry: &HostBindingRegistry) -> Result<(), ScriptHostError> {
    registry.register(
        IMPORT_NAMESPACE,
        IMPORT_PRINT,
        BindingSignature::new([NumType::I32, NumType::I32], []),
        Box::new(install_print),
    )
}

/// Build a registry carrying the required bindings.
pub fn default_registry() -> Result<HostBindingRegistry, ScriptHostError> {
    let registry = HostBindingRegistry::new();
    register_print(&registry)?;
    Ok(registry)
}

fn install_print(linker: &mut Linker<HostState>) -> Result<(), ScriptHostError> {
    linker
        .func_wrap(
            IMPORT_NAMESPACE,
            IMPORT_PRINT,
            |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> wasmtime::Result<()> {
                let memory = caller
                    .get_export(EXPORT_MEMORY)
                    .and_then(Extern::into_memory)
                    .ok_or_else(|| {
                        wasmtime::Error::msg("Guest called js_print without a memory export")
                    })?;

                // Negative values become large offsets here and fail
                // the bounds check inside decode_string.
                #[allow(clippy::cast_sign_loss)]
                let message = decode_string(&caller, &memory, ptr as u32, len as u32)
                    .map_err(wasmtime::Error::new)?;

                let request_id = caller
                    .data()
                    .current_request()
                    .unwrap_or("-")
                    .to_string();
                info!(request_id = %request_id, guest_log = true, "{}", message);

                caller.data_mut().record_guest_log(message);
                Ok(())
            },
        )
        .map_err(|e| {
            ScriptHostError::invalid_config(format!("Failed to define {IMPORT_PRINT}: {e}"))
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use script_host_common::EngineConfig;
    use script_host_core::{CompiledModule, WasmEngine};
    use wasmtime::Store;

    const PRINT_GUEST: &str = r#"
        (module
            (import "env" "js_print" (func $print (param i32 i32)))
            (memory (export "memory") 1)
            (data (i32.const 0) "Hello from guest")

            (func (export "say_hello")
                (call $print (i32.const 0) (i32.const 16)))
            (func (export "say_out_of_bounds")
                (call $print (i32.const 65530) (i32.const 100)))
            (func (export "say_negative")
                (call $print (i32.const -8) (i32.const 4)))
        )
    "#;

    async fn instantiate() -> (Store<HostState>, wasmtime::Instance) {
        let engine = WasmEngine::new(&EngineConfig {
            epoch_interruption: false,
            ..Default::default()
        })
        .unwrap();
        let mut linker = Linker::new(engine.inner());
        default_registry().unwrap().install(&mut linker).unwrap();

        let module = CompiledModule::from_wat(engine.inner(), PRINT_GUEST).unwrap();
        let mut store = Store::new(engine.inner(), HostState::new());
        let instance = linker
            .instantiate_async(&mut store, module.as_module())
            .await
            .unwrap();
        (store, instance)
    }

    #[tokio::test]
    async fn test_print_captures_message() {
        let (mut store, instance) = instantiate().await;
        store.data_mut().begin_request("req-1");

        let func = instance
            .get_typed_func::<(), ()>(&mut store, "say_hello")
            .unwrap();
        func.call_async(&mut store, ()).await.unwrap();

        let logs = &store.data().guest_logs;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "Hello from guest");
    }

    #[tokio::test]
    async fn test_print_rejects_out_of_bounds() {
        let (mut store, instance) = instantiate().await;

        let func = instance
            .get_typed_func::<(), ()>(&mut store, "say_out_of_bounds")
            .unwrap();
        let err = func.call_async(&mut store, ()).await.unwrap_err();

        // The host error travels through the trap
        assert!(matches!(
            err.downcast_ref::<ScriptHostError>(),
            Some(ScriptHostError::MemoryAccess { .. })
        ));
        assert!(store.data().guest_logs.is_empty());
    }

    #[tokio::test]
    async fn test_print_rejects_negative_pointer() {
        let (mut store, instance) = instantiate().await;

        let func = instance
            .get_typed_func::<(), ()>(&mut store, "say_negative")
            .unwrap();
        let err = func.call_async(&mut store, ()).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ScriptHostError>(),
            Some(ScriptHostError::MemoryAccess { .. })
        ));
    }
}
