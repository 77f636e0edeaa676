//! Scripting environment management.
//!
//! CPython is a per-process runtime, so "one interpreter per layer" maps to
//! one *environment* per layer: a private globals dictionary carrying the
//! builtins, the registered `meta` command, and the published layer context
//! variables. Environments are reference-counted and shared across layer
//! sessions:
//!
//! - the **default** environment is created lazily on first acquisition and
//!   lives until [`ScriptEnv::shutdown_default`];
//! - an **external** environment is built by the host, registered, and
//!   referenced from layer metadata through a hexadecimal handle under the
//!   `interpreter` key;
//! - a **private** environment belongs to whoever holds the last reference.

use std::collections::HashMap;
use std::ffi::CString;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use lazy_static::lazy_static;
use pylayer_common::layer::Layer;
use pylayer_common::metadata::Metadata;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::error::{PyLayerError, PyLayerResult};
use crate::meta;

/// Layer metadata key carrying an externally registered interpreter handle.
pub const META_INTERPRETER: &str = "interpreter";
/// Layer metadata key carrying the procedure namespace prefix.
pub const META_NAMESPACE: &str = "namespace";

lazy_static! {
    static ref DEFAULT_ENV: Mutex<Option<Arc<ScriptEnv>>> = Mutex::new(None);
    static ref EXTERNAL_ENVS: Mutex<HashMap<u64, Arc<ScriptEnv>>> = Mutex::new(HashMap::new());
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// One scripting environment: a globals dictionary inside the process-wide
/// Python runtime, plus the active-layer binding used by the `meta` command.
#[derive(Debug)]
pub struct ScriptEnv {
    globals: Py<PyDict>,
    /// The `layer` namespace object holding the published context variables.
    context: Py<PyAny>,
    active: Arc<Mutex<Option<Metadata>>>,
    default: bool,
}

impl ScriptEnv {
    fn create(default: bool) -> PyLayerResult<Arc<ScriptEnv>> {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            let globals = PyDict::new(py);
            let builtins = py.import("builtins").map_err(|err| {
                PyLayerError::Initialization(format!("cannot import builtins: {err}"))
            })?;
            globals.set_item("__builtins__", &builtins).map_err(|err| {
                PyLayerError::Initialization(format!("cannot seed environment globals: {err}"))
            })?;
            // The `layer` namespace object carries the published context
            // variables, the way the original exposes a global layer array.
            let context = py
                .import("types")
                .and_then(|types| types.getattr("SimpleNamespace"))
                .and_then(|namespace| namespace.call0())
                .map_err(|err| {
                    PyLayerError::Initialization(format!(
                        "cannot create the layer context namespace: {err}"
                    ))
                })?;
            globals.set_item("layer", &context).map_err(|err| {
                PyLayerError::Initialization(format!("cannot publish the layer context: {err}"))
            })?;
            let active: Arc<Mutex<Option<Metadata>>> = Arc::new(Mutex::new(None));
            meta::register(py, &globals, active.clone()).map_err(|err| {
                PyLayerError::Initialization(format!("cannot register the meta command: {err}"))
            })?;
            Ok(Arc::new(ScriptEnv {
                globals: globals.unbind(),
                context: context.unbind(),
                active,
                default,
            }))
        })
    }

    /// Build a private environment, owned by whoever holds the last
    /// reference to it.
    pub fn private() -> PyLayerResult<Arc<ScriptEnv>> {
        Self::create(false)
    }

    /// Resolve the environment a layer session should use: the externally
    /// registered one named by the layer's `interpreter` metadata, or the
    /// process-wide default, created on first use.
    ///
    /// An unparsable handle falls through to the default environment; a
    /// parsable handle that names nothing is a configuration error.
    pub fn acquire(layer: &Layer) -> PyLayerResult<Arc<ScriptEnv>> {
        if let Some(token) = layer.metadata.get(META_INTERPRETER) {
            if let Ok(handle) = u64::from_str_radix(token.trim(), 16) {
                let registry = EXTERNAL_ENVS.lock().unwrap_or_else(PoisonError::into_inner);
                return registry.get(&handle).cloned().ok_or_else(|| {
                    PyLayerError::Configuration(format!(
                        "layer '{}' references unknown interpreter handle '{}'",
                        layer.name, token
                    ))
                });
            }
        }

        {
            let slot = DEFAULT_ENV.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(env) = slot.as_ref() {
                return Ok(env.clone());
            }
        }
        // Created outside the slot lock; the GIL must never be awaited
        // while the slot is held.
        let env = Self::create(true)?;
        let mut slot = DEFAULT_ENV.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }
        *slot = Some(env.clone());
        Ok(env)
    }

    /// Register an environment for external attachment and return the
    /// handle a host should place under the `interpreter` metadata key.
    pub fn register_external(env: &Arc<ScriptEnv>) -> String {
        let handle = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
        EXTERNAL_ENVS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, env.clone());
        format!("{handle:x}")
    }

    /// Drop a registration made by [`ScriptEnv::register_external`].
    pub fn unregister_external(token: &str) -> bool {
        match u64::from_str_radix(token.trim(), 16) {
            Ok(handle) => EXTERNAL_ENVS
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&handle)
                .is_some(),
            Err(_) => false,
        }
    }

    /// Release the process-wide default environment. Sessions still holding
    /// a reference keep it alive until they close.
    pub fn shutdown_default() {
        DEFAULT_ENV
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_default(&self) -> bool {
        self.default
    }

    pub(crate) fn globals<'py>(&self, py: Python<'py>) -> Bound<'py, PyDict> {
        self.globals.bind(py).clone()
    }

    /// Execute script code in this environment, e.g. a layer's connection
    /// string or host-side priming code.
    pub fn eval(&self, py: Python<'_>, code: &str) -> PyResult<()> {
        let code = CString::new(code)?;
        py.run(code.as_c_str(), Some(self.globals.bind(py)), None)
    }

    /// Bind `metadata` as the active layer for the duration of the returned
    /// guard. The `meta` command refuses to run without an active binding.
    pub(crate) fn bind_layer(&self, metadata: Metadata) -> ActiveLayerGuard {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(metadata);
        ActiveLayerGuard {
            active: self.active.clone(),
        }
    }

    /// The `layer` context namespace object.
    pub(crate) fn context<'py>(&self, py: Python<'py>) -> Bound<'py, PyAny> {
        self.context.bind(py).clone()
    }

    pub(crate) fn set_layer_var<'py, V>(
        &self,
        py: Python<'py>,
        name: &str,
        value: V,
    ) -> PyResult<()>
    where
        V: IntoPyObject<'py>,
    {
        self.context.bind(py).setattr(name, value)
    }

    /// Publish a string context variable, skipping absent values.
    pub(crate) fn set_opt_layer_var(
        &self,
        py: Python<'_>,
        name: &str,
        value: Option<&str>,
    ) -> PyResult<()> {
        match value {
            Some(value) => self.set_layer_var(py, name, value),
            None => Ok(()),
        }
    }

    pub(crate) fn unset_layer_var(&self, py: Python<'_>, name: &str) -> PyResult<()> {
        let context = self.context.bind(py);
        if context.hasattr(name)? {
            context.delattr(name)?;
        }
        Ok(())
    }
}

/// Clears the active-layer binding when layer-scoped evaluation ends.
pub(crate) struct ActiveLayerGuard {
    active: Arc<Mutex<Option<Metadata>>>,
}

impl Drop for ActiveLayerGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pylayer_common::layer::LayerType;

    #[test]
    fn external_registration_roundtrip() {
        let env = ScriptEnv::private().unwrap();
        let token = ScriptEnv::register_external(&env);

        let layer = Layer::new("ext", LayerType::Point);
        layer.metadata.set(META_INTERPRETER, token.clone());
        let acquired = ScriptEnv::acquire(&layer).unwrap();
        assert!(Arc::ptr_eq(&env, &acquired));
        assert!(!acquired.is_default());

        assert!(ScriptEnv::unregister_external(&token));
        assert!(!ScriptEnv::unregister_external(&token));
        let err = ScriptEnv::acquire(&layer).unwrap_err();
        assert!(matches!(err, PyLayerError::Configuration(_)));
    }

    #[test]
    fn unknown_handle_is_a_configuration_error() {
        let layer = Layer::new("bad", LayerType::Point);
        layer.metadata.set(META_INTERPRETER, "fffffffffffffff0");
        let err = ScriptEnv::acquire(&layer).unwrap_err();
        assert!(matches!(err, PyLayerError::Configuration(_)));
    }

    #[test]
    fn default_environment_is_created_once_and_shared() {
        let a = ScriptEnv::acquire(&Layer::new("a", LayerType::Point)).unwrap();
        let b = ScriptEnv::acquire(&Layer::new("b", LayerType::Line)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_default());

        ScriptEnv::shutdown_default();
        // Existing references stay valid; the next acquisition starts fresh.
        let c = ScriptEnv::acquire(&Layer::new("c", LayerType::Point)).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn eval_defines_globals() {
        let env = ScriptEnv::private().unwrap();
        Python::with_gil(|py| {
            env.eval(py, "answer = 41 + 1").unwrap();
            let answer: i64 = env
                .globals(py)
                .get_item("answer")
                .unwrap()
                .unwrap()
                .extract()
                .unwrap();
            assert_eq!(answer, 42);
        });
    }
}
