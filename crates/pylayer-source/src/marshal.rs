//! Geometry and attribute marshaling.
//!
//! Backend procedures return loosely-typed values; everything is validated
//! here, at the boundary, and converted into typed [`Shape`] records before
//! it can travel further into the engine. Coordinates and row counts accept
//! numbers or strings that parse as numbers, matching the original
//! everything-is-a-string scripting semantics.

use log::debug;
use pylayer_common::geometry::{Point, Shape, ShapeKind};
use pylayer_common::layer::{Layer, LayerType};
use pyo3::prelude::*;

use crate::command::CommandTable;
use crate::error::{script_error, PyLayerError, PyLayerResult};
use crate::interpreter::ScriptEnv;

/// A printable rendition of a script value for diagnostics.
pub(crate) fn repr_of(value: &Bound<'_, PyAny>) -> String {
    match value.repr() {
        Ok(repr) => repr.to_string_lossy().into_owned(),
        Err(_) => "<unrepresentable value>".to_string(),
    }
}

fn coerce_f64(value: &Bound<'_, PyAny>) -> Option<f64> {
    if let Ok(number) = value.extract::<f64>() {
        return Some(number);
    }
    if let Ok(text) = value.extract::<String>() {
        return text.trim().parse().ok();
    }
    None
}

/// Interpret a procedure's return value as a row count.
pub(crate) fn coerce_row_count(
    value: &Bound<'_, PyAny>,
    procedure: &str,
) -> PyLayerResult<i64> {
    if let Ok(count) = value.extract::<i64>() {
        return Ok(count);
    }
    if let Ok(text) = value.extract::<String>() {
        if let Ok(count) = text.trim().parse::<i64>() {
            return Ok(count);
        }
    }
    Err(PyLayerError::Contract(format!(
        "{procedure} returned {}; expected an integer row count",
        repr_of(value)
    )))
}

/// Fetch one row: invoke `get_geometry`, validate and convert the part
/// lists, and, when the row carries drawable geometry, invoke
/// `get_attributes` and validate the value arity.
pub(crate) fn read_shape(
    py: Python<'_>,
    env: &ScriptEnv,
    commands: &CommandTable,
    layer: &Layer,
    row: i64,
) -> PyLayerResult<Shape> {
    if layer.debug > 1 {
        debug!("reading row {row} of layer '{}'", layer.name);
    }

    let command = &commands.get_geometry;
    let geometry = command
        .resolve(py, env)?
        .call1((row,))
        .map_err(|err| script_error(py, command.name(), err, layer.debug))?;
    let parts: Vec<Bound<'_, PyAny>> = geometry.extract().map_err(|_| {
        PyLayerError::Contract(format!(
            "{} returned {}; expected a list of coordinate lists",
            command.name(),
            repr_of(&geometry)
        ))
    })?;

    let mut shape = Shape::null();
    if !parts.is_empty() {
        shape.kind = match layer.layer_type {
            LayerType::Point => ShapeKind::Point,
            LayerType::Line => ShapeKind::Line,
            LayerType::Polygon => ShapeKind::Polygon,
            other => {
                if layer.debug > 1 {
                    debug!(
                        "layer type '{other}' carries no drawable geometry; \
                         dropping row {row} of layer '{}'",
                        layer.name
                    );
                }
                ShapeKind::Null
            }
        };
    }
    if layer.debug > 1 {
        debug!("row {row}: {} geometry parts", parts.len());
    }

    for (index, part) in parts.iter().enumerate() {
        let coordinates: Vec<Bound<'_, PyAny>> = part.extract().map_err(|_| {
            PyLayerError::Contract(format!(
                "{} returned {} in geometry part {index}; expected a flat coordinate list",
                command.name(),
                repr_of(part)
            ))
        })?;
        if coordinates.is_empty() {
            continue;
        }
        if coordinates.len() % 2 == 1 {
            return Err(PyLayerError::Contract(format!(
                "{} returned an odd number of elements ({}) in geometry part {index}",
                command.name(),
                coordinates.len()
            )));
        }
        let mut line = Vec::with_capacity(coordinates.len() / 2);
        for pair in 0..coordinates.len() / 2 {
            let x = read_coordinate(&coordinates, command.name(), index, pair * 2)?;
            let y = read_coordinate(&coordinates, command.name(), index, pair * 2 + 1)?;
            line.push(Point::new(x, y));
        }
        shape.add_part(line);
    }

    if shape.parts.is_empty() {
        shape.kind = ShapeKind::Null;
    }
    if shape.is_null() {
        return Ok(shape);
    }
    shape.compute_bounds();

    let command = &commands.get_attributes;
    let attributes = command
        .resolve(py, env)?
        .call1((row,))
        .map_err(|err| script_error(py, command.name(), err, layer.debug))?;
    let values: Vec<Bound<'_, PyAny>> = attributes.extract().map_err(|_| {
        PyLayerError::Contract(format!(
            "{} returned {}; expected a flat list of values",
            command.name(),
            repr_of(&attributes)
        ))
    })?;
    if values.len() != layer.items.len() {
        return Err(PyLayerError::Contract(format!(
            "{} returned {} values, expected {}",
            command.name(),
            values.len(),
            layer.items.len()
        )));
    }
    for (item, value) in layer.items.iter().zip(&values) {
        let text = value
            .str()
            .map_err(|err| script_error(py, command.name(), err, layer.debug))?;
        let text = text.to_string_lossy().into_owned();
        if layer.debug > 1 {
            debug!("row {row}: [{item}] \"{text}\"");
        }
        shape.values.push(text);
    }

    shape.index = row;
    Ok(shape)
}

fn read_coordinate(
    coordinates: &[Bound<'_, PyAny>],
    procedure: &str,
    part: usize,
    element: usize,
) -> PyLayerResult<f64> {
    coerce_f64(&coordinates[element]).ok_or_else(|| {
        PyLayerError::Contract(format!(
            "{procedure} geometry part {part} element {element}: expected a number, got {}",
            repr_of(&coordinates[element])
        ))
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;

    use super::*;

    fn py_value<'py>(py: Python<'py>, expression: &str) -> Bound<'py, PyAny> {
        py.eval(&CString::new(expression).unwrap(), None, None).unwrap()
    }

    #[test]
    fn row_counts_accept_integers_and_numeric_strings() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            assert_eq!(coerce_row_count(&py_value(py, "17"), "geo_query").unwrap(), 17);
            assert_eq!(
                coerce_row_count(&py_value(py, "' 4 '"), "geo_query").unwrap(),
                4
            );
            let err = coerce_row_count(&py_value(py, "'many'"), "geo_query").unwrap_err();
            assert!(matches!(err, PyLayerError::Contract(message)
                if message.contains("geo_query") && message.contains("row count")));
        });
    }

    #[test]
    fn coordinates_accept_numbers_and_numeric_strings() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            assert_eq!(coerce_f64(&py_value(py, "1.5")), Some(1.5));
            assert_eq!(coerce_f64(&py_value(py, "3")), Some(3.0));
            assert_eq!(coerce_f64(&py_value(py, "'2.25'")), Some(2.25));
            assert_eq!(coerce_f64(&py_value(py, "'north'")), None);
            assert_eq!(coerce_f64(&py_value(py, "None")), None);
        });
    }
}
