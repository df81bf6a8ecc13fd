//! Host function registry.
//!
//! Host callables importable by the guest are declared here as
//! [`HostBinding`]s: a `(namespace, name, numeric signature, installer)`
//! tuple. The registry is mutable until [`install`] wires the bindings
//! into a linker, at which point it freezes: the binding set visible to
//! a live instance can never change after instantiation.
//!
//! [`install`]: HostBindingRegistry::install

use parking_lot::Mutex;
use tracing::{debug, info};
use wasmtime::Linker;

use script_host_common::ScriptHostError;
use script_host_core::HostState;

/// Numeric value types permitted in binding signatures.
///
/// The sandbox ABI only ever passes scalars (offsets and lengths);
/// rich objects never cross the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumType {
    /// 32-bit integer.
    I32,
    /// 64-bit integer.
    I64,
}

/// A binding's fixed numeric signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSignature {
    /// Parameter types, in order.
    pub params: Vec<NumType>,
    /// Result types, in order.
    pub results: Vec<NumType>,
}

impl BindingSignature {
    /// Build a signature from parameter and result types.
    pub fn new(
        params: impl IntoIterator<Item = NumType>,
        results: impl IntoIterator<Item = NumType>,
    ) -> Self {
        Self {
            params: params.into_iter().collect(),
            results: results.into_iter().collect(),
        }
    }
}

/// Closure that defines one binding on a linker.
pub type Installer =
    Box<dyn Fn(&mut Linker<HostState>) -> Result<(), ScriptHostError> + Send + Sync>;

/// One host callable importable by the guest.
pub struct HostBinding {
    /// Import namespace (module field of the guest import).
    pub namespace: String,
    /// Import name.
    pub name: String,
    /// Fixed numeric signature, for diagnostics and introspection.
    pub signature: BindingSignature,
    installer: Installer,
}

impl std::fmt::Debug for HostBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBinding")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RegistryInner {
    bindings: Vec<HostBinding>,
    frozen: bool,
}

/// Registry of host bindings, frozen at link time.
#[derive(Default)]
pub struct HostBindingRegistry {
    inner: Mutex<RegistryInner>,
}

impl HostBindingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one host callable.
    ///
    /// # Errors
    ///
    /// Fails when the registry is already frozen (an instance exists)
    /// or a binding with the same namespace and name is present.
    pub fn register(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        signature: BindingSignature,
        installer: Installer,
    ) -> Result<(), ScriptHostError> {
        let namespace = namespace.into();
        let name = name.into();
        let mut inner = self.inner.lock();

        if inner.frozen {
            return Err(ScriptHostError::invalid_config(format!(
                "Cannot register '{namespace}::{name}': registry is frozen after linking"
            )));
        }

        if inner
            .bindings
            .iter()
            .any(|b| b.namespace == namespace && b.name == name)
        {
            return Err(ScriptHostError::invalid_config(format!(
                "Binding '{namespace}::{name}' is already registered"
            )));
        }

        debug!(namespace = %namespace, name = %name, "Host binding registered");

        inner.bindings.push(HostBinding {
            namespace,
            name,
            signature,
            installer,
        });

        Ok(())
    }

    /// Define every registered binding on the linker and freeze the
    /// registry.
    ///
    /// # Errors
    ///
    /// Fails when any installer fails; the registry freezes regardless,
    /// since a partially linked set must not be extended either.
    pub fn install(&self, linker: &mut Linker<HostState>) -> Result<(), ScriptHostError> {
        let mut inner = self.inner.lock();
        inner.frozen = true;

        for binding in &inner.bindings {
            (binding.installer)(linker)?;
        }

        info!(bindings = inner.bindings.len(), "Host bindings linked; registry frozen");
        Ok(())
    }

    /// Whether linking has happened.
    pub fn is_frozen(&self) -> bool {
        self.inner.lock().frozen
    }

    /// Number of registered bindings.
    pub fn len(&self) -> usize {
        self.inner.lock().bindings.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `(namespace, name)` pairs currently registered.
    pub fn binding_names(&self) -> Vec<(String, String)> {
        self.inner
            .lock()
            .bindings
            .iter()
            .map(|b| (b.namespace.clone(), b.name.clone()))
            .collect()
    }
}

impl std::fmt::Debug for HostBindingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("HostBindingRegistry")
            .field("bindings", &inner.bindings.len())
            .field("frozen", &inner.frozen)
            .finish()
    }
}
