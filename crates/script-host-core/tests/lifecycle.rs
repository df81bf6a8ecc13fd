//! Integration tests for the engine lifecycle.
//!
//! These tests drive [`EngineHost`] end to end against small WAT guests
//! implementing the evaluation ABI:
//! - init / teardown idempotence
//! - missing and corrupt assets
//! - evaluation round trips, script errors, and trap classification
//! - reinitialization after a fatal trap

use std::fs;
use std::path::PathBuf;

use uuid::Uuid;

use script_host_common::{EngineConfig, ScriptHostError};
use script_host_core::{AssetStore, EngineHost};

// Guest that implements the full ABI and echoes its input back as a
// successful result (status byte 0 + input bytes).
const ECHO_GUEST: &str = r#"
    (module
        (memory (export "memory") 2)
        (global $next (mut i32) (i32.const 16))
        (func $alloc (export "js_alloc") (param $n i32) (result i32)
            (local $p i32)
            (local.set $p (global.get $next))
            (global.set $next (i32.add (global.get $next) (local.get $n)))
            (local.get $p))
        (func (export "js_free") (param i32 i32))
        (func (export "js_eval") (param $ptr i32) (param $len i32) (result i64)
            (local $out i32)
            (local.set $out (call $alloc (i32.add (local.get $len) (i32.const 1))))
            (i32.store8 (local.get $out) (i32.const 0))
            (memory.copy
                (i32.add (local.get $out) (i32.const 1))
                (local.get $ptr)
                (local.get $len))
            (i64.or
                (i64.shl (i64.extend_i32_u (local.get $out)) (i64.const 32))
                (i64.extend_i32_u (i32.add (local.get $len) (i32.const 1)))))
    )
"#;

// Guest whose evaluation always reports a script-level exception
// (status byte 1 + message).
const SCRIPT_ERROR_GUEST: &str = r#"
    (module
        (memory (export "memory") 1)
        (data (i32.const 16) "\01ReferenceError: x is not defined")
        (func (export "js_alloc") (param i32) (result i32)
            (i32.const 256))
        (func (export "js_eval") (param i32 i32) (result i64)
            (i64.or (i64.shl (i64.const 16) (i64.const 32)) (i64.const 33)))
    )
"#;

// Guest that traps with an unreachable instruction (non-fatal).
const TRAP_GUEST: &str = r#"
    (module
        (memory (export "memory") 1)
        (func (export "js_alloc") (param i32) (result i32)
            (i32.const 8))
        (func (export "js_eval") (param i32 i32) (result i64)
            unreachable)
    )
"#;

// Guest that reads far past linear memory (fatal: MemoryOutOfBounds).
const FATAL_TRAP_GUEST: &str = r#"
    (module
        (memory (export "memory") 1)
        (func (export "js_alloc") (param i32) (result i32)
            (i32.const 8))
        (func (export "js_eval") (param i32 i32) (result i64)
            (i64.extend_i32_u (i32.load (i32.const 0x7ffffff0))))
    )
"#;

// Guest missing the evaluation export entirely.
const NO_EVAL_GUEST: &str = r#"
    (module
        (memory (export "memory") 1)
    )
"#;

fn stage_asset(wat: &str) -> AssetStore {
    let base: PathBuf =
        std::env::temp_dir().join(format!("script-host-lifecycle-{}", Uuid::new_v4()));
    let assets = base.join("assets");
    fs::create_dir_all(&assets).unwrap();
    let binary = wat::parse_str(wat).unwrap();
    fs::write(assets.join("quickjs.wasm"), binary).unwrap();
    AssetStore::new(assets, base.join("cache"))
}

fn test_config() -> EngineConfig {
    EngineConfig {
        epoch_interruption: false,
        ..Default::default()
    }
}

async fn ready_host(wat: &str) -> EngineHost {
    let mut host = EngineHost::new(&test_config(), stage_asset(wat)).unwrap();
    host.init().await.unwrap();
    host
}

// ============================================================================
// Test: Init / Teardown
// ============================================================================

#[tokio::test]
async fn test_init_is_idempotent() {
    let mut host = EngineHost::new(&test_config(), stage_asset(ECHO_GUEST)).unwrap();
    assert!(!host.is_ready());

    host.init().await.unwrap();
    assert!(host.is_ready());

    // Second init without teardown is a no-op and still succeeds
    host.init().await.unwrap();
    assert!(host.is_ready());

    // The instance from before the second init still serves requests
    let value = host.eval("r1", "still alive", 1000).await.unwrap();
    assert_eq!(value, "still alive");
}

#[tokio::test]
async fn test_teardown_is_idempotent() {
    let mut host = ready_host(ECHO_GUEST).await;

    host.teardown();
    assert!(!host.is_ready());

    // Safe when already uninitialized
    host.teardown();
    assert!(!host.is_ready());
}

#[tokio::test]
async fn test_init_missing_asset() {
    let base = std::env::temp_dir().join(format!("script-host-missing-{}", Uuid::new_v4()));
    let assets = AssetStore::new(base.join("assets"), base.join("cache"));
    let mut host = EngineHost::new(&test_config(), assets).unwrap();

    let result = host.init().await;
    assert!(matches!(result, Err(ScriptHostError::Init { .. })));
    assert!(!host.is_ready());
    assert!(host.last_init_error().is_some());

    // Requests are refused, not crashed on
    let result = host.eval("r1", "1+1", 1000).await;
    assert!(matches!(result, Err(ScriptHostError::NotReady { .. })));
}

#[tokio::test]
async fn test_init_corrupt_asset() {
    let base = std::env::temp_dir().join(format!("script-host-corrupt-{}", Uuid::new_v4()));
    let assets_dir = base.join("assets");
    fs::create_dir_all(&assets_dir).unwrap();
    fs::write(assets_dir.join("quickjs.wasm"), b"definitely not wasm").unwrap();

    let assets = AssetStore::new(assets_dir, base.join("cache"));
    let mut host = EngineHost::new(&test_config(), assets).unwrap();

    assert!(matches!(
        host.init().await,
        Err(ScriptHostError::Init { .. })
    ));
    assert!(!host.is_ready());
}

#[tokio::test]
async fn test_init_missing_eval_export() {
    let mut host = EngineHost::new(&test_config(), stage_asset(NO_EVAL_GUEST)).unwrap();

    let result = host.init().await;
    assert!(matches!(result, Err(ScriptHostError::Init { .. })));
    assert!(!host.is_ready());
}

// ============================================================================
// Test: Evaluation
// ============================================================================

#[tokio::test]
async fn test_eval_echo_round_trip() {
    let mut host = ready_host(ECHO_GUEST).await;

    for source in ["1+1", "function add(a,b){return a+b;}; add(40,2);", "日本語"] {
        let value = host.eval("req", source, 1000).await.unwrap();
        assert_eq!(value, source);
    }
}

#[tokio::test]
async fn test_eval_script_error() {
    let mut host = ready_host(SCRIPT_ERROR_GUEST).await;

    let result = host.eval("req", "x", 1000).await;
    match result {
        Err(ScriptHostError::Script { message }) => {
            assert_eq!(message, "ReferenceError: x is not defined");
        }
        other => panic!("expected script error, got {other:?}"),
    }

    // A guest-level exception is per-request; the instance is kept
    assert!(host.is_ready());
}

#[tokio::test]
async fn test_eval_nonfatal_trap_keeps_instance() {
    let mut host = ready_host(TRAP_GUEST).await;

    let result = host.eval("req", "boom", 1000).await;
    match result {
        Err(err @ ScriptHostError::Trap { .. }) => assert!(!err.requires_restart()),
        other => panic!("expected trap, got {other:?}"),
    }
    assert!(host.is_ready());
}

#[tokio::test]
async fn test_eval_fatal_trap_then_reinit() {
    let mut host = ready_host(FATAL_TRAP_GUEST).await;

    let result = host.eval("req", "boom", 1000).await;
    match result {
        Err(err @ ScriptHostError::Trap { .. }) => assert!(err.requires_restart()),
        other => panic!("expected fatal trap, got {other:?}"),
    }

    // Transparent recovery: teardown + init leaves a fresh instance
    host.reinit().await.unwrap();
    assert!(host.is_ready());
}

#[tokio::test]
async fn test_eval_after_teardown_refused() {
    let mut host = ready_host(ECHO_GUEST).await;
    host.teardown();

    let result = host.eval("req", "1", 1000).await;
    assert!(matches!(result, Err(ScriptHostError::NotReady { .. })));
}
