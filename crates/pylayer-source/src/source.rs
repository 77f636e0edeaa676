//! The engine-facing layer source and its open/query/iterate/close state
//! machine.

use std::sync::Arc;

use log::{debug, warn};
use pylayer_common::error::EngineResult;
use pylayer_common::geometry::{Rect, Shape};
use pylayer_common::layer::Layer;
use pylayer_common::source::{ShapeLookup, VectorSource};
use pyo3::prelude::*;
use pyo3::types::PyList;

use crate::command::CommandTable;
use crate::error::{script_error, PyLayerError, PyLayerResult};
use crate::interpreter::{ScriptEnv, META_NAMESPACE};
use crate::marshal;
use crate::timefilter;

/// Per-open-layer state: the environment reference, the pinned command
/// bindings, and the iteration cursor.
struct LayerSession {
    env: Arc<ScriptEnv>,
    commands: CommandTable,
    namespace: Option<String>,
    /// Next row to fetch, 0-based.
    row: i64,
    /// Total row count; unset until a query has run.
    rows: Option<i64>,
}

/// A vector layer whose backend is a set of Python procedures.
pub struct PyLayerSource {
    layer: Layer,
    session: Option<LayerSession>,
}

impl PyLayerSource {
    pub fn new(layer: Layer) -> Self {
        Self {
            layer,
            session: None,
        }
    }

    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    pub fn layer_mut(&mut self) -> &mut Layer {
        &mut self.layer
    }

    fn do_open(&mut self) -> PyLayerResult<()> {
        if self.session.is_some() {
            if self.layer.debug > 0 {
                debug!("layer '{}' is already open", self.layer.name);
            }
            return Ok(());
        }
        match self.layer.data.as_deref() {
            Some(data) if !data.is_empty() => {}
            _ => {
                return Err(PyLayerError::configuration(format!(
                    "nothing specified in the data statement for layer '{}'",
                    self.layer.name
                )))
            }
        }
        if self.layer.debug > 0 {
            debug!(
                "opening layer '{}', data '{}'",
                self.layer.name,
                self.layer.data.as_deref().unwrap_or_default()
            );
        }

        let env = ScriptEnv::acquire(&self.layer)?;
        let namespace = self.layer.metadata.get(META_NAMESPACE);
        let session = LayerSession {
            env,
            commands: CommandTable::new(namespace.as_deref()),
            namespace,
            row: 0,
            rows: None,
        };

        Python::with_gil(|py| -> PyLayerResult<()> {
            let _active = session.env.bind_layer(self.layer.metadata.clone());
            publish_layer_context(py, &session, &self.layer)?;
            sync_namespace(py, &session)?;

            // The open hook is optional and tolerant: an undefined or
            // failing layer_open leaves the connection open.
            let command = &session.commands.layer_open;
            let outcome = command.resolve(py, &session.env).and_then(|callable| {
                callable
                    .call1((self.layer.name.as_str(),))
                    .map_err(|err| script_error(py, command.name(), err, self.layer.debug))
            });
            if let Err(err) = outcome {
                warn!(
                    "{} failed for layer '{}' (ignored): {err}",
                    command.name(),
                    self.layer.name
                );
            }
            Ok(())
        })?;

        self.session = Some(session);
        Ok(())
    }

    fn do_which_shapes(&mut self, rect: Rect) -> PyLayerResult<()> {
        let Self { layer, session } = self;
        let session = session.as_mut().ok_or_else(|| {
            PyLayerError::internal(format!("which_shapes called on closed layer '{}'", layer.name))
        })?;

        Python::with_gil(|py| -> PyLayerResult<()> {
            let _active = session.env.bind_layer(layer.metadata.clone());
            session.env.set_layer_var(py, "debug", layer.debug)?;
            session.env.set_layer_var(
                py,
                "rectangle",
                vec![rect.min_x, rect.min_y, rect.max_x, rect.max_y],
            )?;
            session.env.unset_layer_var(py, "uid")?;

            // The connection string's designed purpose is to import or
            // define the backend procedures.
            if let Some(connection) = layer.connection.as_deref() {
                session.env.eval(py, connection).map_err(|err| {
                    script_error(
                        py,
                        &format!("connection script '{connection}'"),
                        err,
                        layer.debug,
                    )
                })?;
            }
            sync_namespace(py, session)?;

            let items = PyList::new(py, &layer.items)?;
            let command = &session.commands.geo_query;
            let result = command
                .resolve(py, &session.env)?
                .call1((items,))
                .map_err(|err| script_error(py, command.name(), err, layer.debug))?;
            let rows = marshal::coerce_row_count(&result, command.name())?;
            if layer.debug > 0 {
                debug!(
                    "{} found {rows} rows for layer '{}'",
                    command.name(),
                    layer.name
                );
            }
            session.rows = Some(rows);
            session.row = 0;
            Ok(())
        })
    }

    fn do_next_shape(&mut self) -> PyLayerResult<Option<Shape>> {
        let Self { layer, session } = self;
        let session = session.as_mut().ok_or_else(|| {
            PyLayerError::internal(format!("next_shape called on closed layer '{}'", layer.name))
        })?;
        let Some(rows) = session.rows else {
            return Ok(None);
        };

        Python::with_gil(|py| -> PyLayerResult<Option<Shape>> {
            let _active = session.env.bind_layer(layer.metadata.clone());
            // Roll forward until a drawable shape turns up; a fetch failure
            // propagates with the cursor still on the failed row.
            while session.row < rows {
                let shape =
                    marshal::read_shape(py, &session.env, &session.commands, layer, session.row)?;
                session.row += 1;
                if !shape.is_null() {
                    return Ok(Some(shape));
                }
            }
            Ok(None)
        })
    }

    fn do_get_shape(&mut self, record: i64) -> PyLayerResult<ShapeLookup> {
        let Self { layer, session } = self;
        let session = session.as_mut().ok_or_else(|| {
            PyLayerError::internal(format!("get_shape called on closed layer '{}'", layer.name))
        })?;
        if layer.debug > 0 {
            debug!("get_shape called for record {record} of layer '{}'", layer.name);
        }

        Python::with_gil(|py| -> PyLayerResult<ShapeLookup> {
            let _active = session.env.bind_layer(layer.metadata.clone());
            session.env.set_layer_var(py, "debug", layer.debug)?;
            session.env.set_layer_var(py, "uid", record)?;
            sync_namespace(py, session)?;

            let command = &session.commands.get_shape;
            let result = command
                .resolve(py, &session.env)?
                .call0()
                .map_err(|err| script_error(py, command.name(), err, layer.debug))?;
            let count = marshal::coerce_row_count(&result, command.name())?;
            if count == 0 {
                return Ok(ShapeLookup::EndOfData);
            }
            if count > 1 {
                warn!(
                    "{} positioned {count} rows for record {record}; using the first",
                    command.name()
                );
            }

            session.row = 0; // only one result to read
            let shape =
                marshal::read_shape(py, &session.env, &session.commands, layer, session.row)?;
            if shape.is_null() {
                Ok(ShapeLookup::NotFound)
            } else {
                Ok(ShapeLookup::Found(shape))
            }
        })
    }

    fn do_get_items(&mut self) -> PyLayerResult<Vec<String>> {
        let Self { layer, session } = self;
        let session = session.as_mut().ok_or_else(|| {
            PyLayerError::internal(format!("get_items called on closed layer '{}'", layer.name))
        })?;

        Python::with_gil(|py| -> PyLayerResult<Vec<String>> {
            let _active = session.env.bind_layer(layer.metadata.clone());
            let command = &session.commands.get_items;
            let result = command
                .resolve(py, &session.env)?
                .call0()
                .map_err(|err| script_error(py, command.name(), err, layer.debug))?;
            let names: Vec<Bound<'_, PyAny>> = result.extract().map_err(|_| {
                PyLayerError::Contract(format!(
                    "{} returned {}; expected a flat list of field names",
                    command.name(),
                    marshal::repr_of(&result)
                ))
            })?;
            let items = names
                .iter()
                .map(|name| {
                    name.str()
                        .map(|text| text.to_string_lossy().into_owned())
                        .map_err(|err| script_error(py, command.name(), err, layer.debug))
                })
                .collect::<PyLayerResult<Vec<_>>>()?;
            layer.set_items(items.clone());
            Ok(items)
        })
    }

    fn do_close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if self.layer.debug > 0 {
            debug!("closing layer '{}'", self.layer.name);
        }
        Python::with_gil(|py| {
            let _active = session.env.bind_layer(self.layer.metadata.clone());
            // The close hook is best-effort; teardown proceeds regardless.
            let command = &session.commands.layer_close;
            let outcome = command.resolve(py, &session.env).and_then(|callable| {
                callable
                    .call0()
                    .map_err(|err| script_error(py, command.name(), err, self.layer.debug))
            });
            if let Err(err) = outcome {
                warn!(
                    "{} failed for layer '{}' (ignored): {err}",
                    command.name(),
                    self.layer.name
                );
            }
            // Release the pinned command values and the environment
            // reference while the interpreter lock is held.
            drop(session);
        });
    }
}

impl VectorSource for PyLayerSource {
    fn open(&mut self) -> EngineResult<()> {
        Ok(self.do_open()?)
    }

    fn is_open(&self) -> bool {
        self.session.is_some()
    }

    fn which_shapes(&mut self, rect: Rect) -> EngineResult<()> {
        Ok(self.do_which_shapes(rect)?)
    }

    fn next_shape(&mut self) -> EngineResult<Option<Shape>> {
        Ok(self.do_next_shape()?)
    }

    fn get_shape(&mut self, record: i64) -> EngineResult<ShapeLookup> {
        Ok(self.do_get_shape(record)?)
    }

    fn get_items(&mut self) -> EngineResult<Vec<String>> {
        Ok(self.do_get_items()?)
    }

    fn get_extent(&mut self) -> EngineResult<Rect> {
        Ok(Rect::unbounded())
    }

    fn set_time_filter(&mut self, timestring: &str, timefield: &str) -> EngineResult<bool> {
        Ok(timefilter::apply_time_filter(
            &mut self.layer,
            timestring,
            timefield,
        ))
    }

    fn close(&mut self) {
        self.do_close();
    }
}

/// Publish the layer definition into the `layer` context namespace, the
/// same names the original exposes through its global layer array.
fn publish_layer_context(
    py: Python<'_>,
    session: &LayerSession,
    layer: &Layer,
) -> PyResult<()> {
    let env = &session.env;
    env.set_opt_layer_var(py, "data", layer.data.as_deref())?;
    env.set_opt_layer_var(py, "template", layer.template.as_deref())?;
    env.set_layer_var(py, "name", layer.name.as_str())?;
    env.set_opt_layer_var(py, "connection", layer.connection.as_deref())?;
    env.set_opt_layer_var(py, "plugin_library", layer.plugin_library.as_deref())?;
    env.set_opt_layer_var(py, "filter_item", layer.filter_item.as_deref())?;
    env.set_opt_layer_var(py, "style_item", layer.style_item.as_deref())?;
    env.set_opt_layer_var(py, "requires", layer.requires.as_deref())?;
    env.set_opt_layer_var(py, "label_requires", layer.label_requires.as_deref())?;
    env.set_opt_layer_var(py, "classgroup", layer.class_group.as_deref())?;
    env.set_layer_var(py, "type", layer.layer_type.as_str())?;
    env.set_layer_var(py, "debug", layer.debug)?;
    Ok(())
}

/// Hand the `layer` context object and the `meta` command to the namespace
/// module, so module-resident procedures see them under the same names as
/// procedures defined in the environment globals. The context object is
/// shared, so later `uid`/`rectangle` updates are visible without another
/// sync. Skipped silently while the module is not importable (the
/// connection script may be the thing that creates it).
fn sync_namespace(py: Python<'_>, session: &LayerSession) -> PyResult<()> {
    let Some(namespace) = session.namespace.as_deref() else {
        return Ok(());
    };
    let Ok(module) = py.import(namespace) else {
        return Ok(());
    };
    module.setattr("layer", session.env.context(py))?;
    if let Some(meta) = session.env.globals(py).get_item("meta")? {
        module.setattr("meta", meta)?;
    }
    Ok(())
}
