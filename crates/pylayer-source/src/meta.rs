//! The script-side `meta` command.
//!
//! Scripts read and write the active layer's metadata table through one
//! callable with verb dispatch:
//!
//! ```python
//! meta("get", name)         # value, or None when absent
//! meta("set", name, value)
//! meta("exists", name)      # bool
//! meta("unset", name)       # no-op when absent
//! meta("names")             # all keys in table order
//! ```
//!
//! The command resolves "the current layer" through the environment's
//! active-layer binding, installed immediately before any layer-scoped
//! evaluation. Calling it with no binding is an adapter bug, not a script
//! error, and raises a diagnostic saying so.

use std::sync::{Arc, Mutex, PoisonError};

use pylayer_common::metadata::Metadata;
use pyo3::exceptions::{PyRuntimeError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyList, PyString, PyTuple};

#[pyclass]
pub(crate) struct MetaCommand {
    active: Arc<Mutex<Option<Metadata>>>,
}

#[pymethods]
impl MetaCommand {
    #[pyo3(signature = (*args))]
    fn __call__(&self, py: Python<'_>, args: &Bound<'_, PyTuple>) -> PyResult<PyObject> {
        let metadata = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                PyRuntimeError::new_err(
                    "software failure: meta command invoked with no active layer bound \
                     to the interpreter",
                )
            })?;

        if args.is_empty() {
            return Err(PyTypeError::new_err(
                "wrong # args: should be \"meta(option, ...)\"",
            ));
        }
        let verb: String = args
            .get_item(0)?
            .extract()
            .map_err(|_| PyTypeError::new_err("meta option must be a string"))?;

        match verb.as_str() {
            "get" => {
                expect_args(args, 2, "meta('get', name)")?;
                let name = name_arg(args, 1)?;
                match metadata.get(&name) {
                    Some(value) => Ok(PyString::new(py, &value).into_any().unbind()),
                    None => Ok(py.None()),
                }
            }
            "set" => {
                expect_args(args, 3, "meta('set', name, value)")?;
                let name = name_arg(args, 1)?;
                let value = args.get_item(2)?;
                let value = value.str()?;
                metadata.set(name, value.to_string_lossy().into_owned());
                Ok(py.None())
            }
            "exists" => {
                expect_args(args, 2, "meta('exists', name)")?;
                let name = name_arg(args, 1)?;
                Ok(PyBool::new(py, metadata.exists(&name))
                    .to_owned()
                    .into_any()
                    .unbind())
            }
            "unset" => {
                expect_args(args, 2, "meta('unset', name)")?;
                let name = name_arg(args, 1)?;
                metadata.unset(&name);
                Ok(py.None())
            }
            "names" => {
                expect_args(args, 1, "meta('names')")?;
                Ok(PyList::new(py, metadata.names())?.into_any().unbind())
            }
            other => Err(PyValueError::new_err(format!(
                "bad meta option \"{other}\": must be get, set, exists, unset, or names"
            ))),
        }
    }
}

fn expect_args(args: &Bound<'_, PyTuple>, count: usize, usage: &str) -> PyResult<()> {
    if args.len() != count {
        return Err(PyTypeError::new_err(format!(
            "wrong # args: should be \"{usage}\""
        )));
    }
    Ok(())
}

fn name_arg(args: &Bound<'_, PyTuple>, index: usize) -> PyResult<String> {
    args.get_item(index)?
        .extract()
        .map_err(|_| PyTypeError::new_err("meta variable name must be a string"))
}

/// Install the `meta` command into an environment's globals.
pub(crate) fn register(
    py: Python<'_>,
    globals: &Bound<'_, PyDict>,
    active: Arc<Mutex<Option<Metadata>>>,
) -> PyResult<()> {
    let command = Py::new(py, MetaCommand { active })?;
    globals.set_item("meta", command)
}
