//! Per-session callback command bindings.
//!
//! The seven backend procedure names are built exactly once when a layer
//! opens, by concatenating the optional namespace prefix from layer
//! metadata. Resolution to a Python callable happens on first invocation
//! and the callable is pinned for the session's lifetime, so the fetch hot
//! path neither re-formats names nor re-resolves procedures. Everything is
//! released together when the session is dropped.

use pyo3::prelude::*;
use pyo3::sync::GILOnceCell;

use crate::error::{PyLayerError, PyLayerResult};
use crate::interpreter::ScriptEnv;

pub(crate) struct Command {
    qualified: String,
    resolved: GILOnceCell<Py<PyAny>>,
}

impl Command {
    fn new(namespace: Option<&str>, name: &str) -> Self {
        let qualified = match namespace {
            Some(namespace) if !namespace.is_empty() => format!("{namespace}.{name}"),
            _ => name.to_string(),
        };
        Self {
            qualified,
            resolved: GILOnceCell::new(),
        }
    }

    /// The fully qualified procedure name, as used in diagnostics.
    pub fn name(&self) -> &str {
        &self.qualified
    }

    /// Resolve the callable, caching it for the session's lifetime.
    ///
    /// A namespace-qualified command resolves as a module attribute; a bare
    /// command resolves from the environment globals (where the connection
    /// script defines the backend procedures).
    pub fn resolve<'py>(
        &self,
        py: Python<'py>,
        env: &ScriptEnv,
    ) -> PyLayerResult<Bound<'py, PyAny>> {
        let resolved = self
            .resolved
            .get_or_try_init(py, || self.lookup(py, env))?;
        Ok(resolved.bind(py).clone())
    }

    fn lookup(&self, py: Python<'_>, env: &ScriptEnv) -> PyLayerResult<Py<PyAny>> {
        let found = match self.qualified.rsplit_once('.') {
            Some((module, attribute)) => py
                .import(module)
                .and_then(|module| module.getattr(attribute))
                .map_err(|err| PyLayerError::Script {
                    procedure: self.qualified.clone(),
                    message: err.to_string(),
                })?,
            None => env
                .globals(py)
                .get_item(&self.qualified)?
                .ok_or_else(|| PyLayerError::Script {
                    procedure: self.qualified.clone(),
                    message: "procedure is not defined".to_string(),
                })?,
        };
        if !found.is_callable() {
            return Err(PyLayerError::Script {
                procedure: self.qualified.clone(),
                message: "bound value is not callable".to_string(),
            });
        }
        Ok(found.unbind())
    }
}

pub(crate) struct CommandTable {
    pub layer_open: Command,
    pub get_items: Command,
    pub get_shape: Command,
    pub geo_query: Command,
    pub get_geometry: Command,
    pub get_attributes: Command,
    pub layer_close: Command,
}

impl CommandTable {
    pub fn new(namespace: Option<&str>) -> Self {
        Self {
            layer_open: Command::new(namespace, "layer_open"),
            get_items: Command::new(namespace, "get_items"),
            get_shape: Command::new(namespace, "get_shape"),
            geo_query: Command::new(namespace, "geo_query"),
            get_geometry: Command::new(namespace, "get_geometry"),
            get_attributes: Command::new(namespace, "get_attributes"),
            layer_close: Command::new(namespace, "layer_close"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_names_are_built_once() {
        let table = CommandTable::new(Some("acme"));
        assert_eq!(table.layer_open.name(), "acme.layer_open");
        assert_eq!(table.geo_query.name(), "acme.geo_query");
        assert_eq!(table.layer_close.name(), "acme.layer_close");

        let bare = CommandTable::new(None);
        assert_eq!(bare.get_geometry.name(), "get_geometry");

        let empty = CommandTable::new(Some(""));
        assert_eq!(empty.get_items.name(), "get_items");
    }

    #[test]
    fn bare_commands_resolve_from_environment_globals() {
        pyo3::prepare_freethreaded_python();
        let env = ScriptEnv::private().unwrap();
        Python::with_gil(|py| {
            env.eval(py, "def get_items():\n    return ['id']").unwrap();
            let table = CommandTable::new(None);
            let callable = table.get_items.resolve(py, &env).unwrap();
            let items: Vec<String> = callable.call0().unwrap().extract().unwrap();
            assert_eq!(items, vec!["id"]);

            let err = table.geo_query.resolve(py, &env).unwrap_err();
            assert!(matches!(err, PyLayerError::Script { procedure, .. } if procedure == "geo_query"));
        });
    }
}
