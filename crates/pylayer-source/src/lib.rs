//! Python-scripted vector layer source.
//!
//! This crate lets a rendering engine read vector features from ANY backend
//! a Python author can reach: the engine drives the `VectorSource` seam, and
//! the adapter delegates every query to a small set of Python procedures.
//!
//! # Architecture
//!
//! ```text
//! Engine (Rust)                        Python
//! ┌───────────────────────┐           ┌─────────────────────┐
//! │ PyLayerSource         │           │ Backend procedures  │
//! │                       │   PyO3    │                     │
//! │ - open / close        │ ────────> │ layer_open          │
//! │ - which_shapes(rect)  │           │ geo_query           │
//! │ - next_shape          │ <──────── │ get_geometry        │
//! │ - get_shape(uid)      │   lists   │ get_attributes, ... │
//! └───────────────────────┘           └─────────────────────┘
//! ```
//!
//! # Python interface
//!
//! The backend implements seven procedures, optionally inside a module named
//! by the layer's `namespace` metadata:
//!
//! ```python
//! def layer_open(name): ...            # optional, best-effort
//! def get_items(): ...                 # -> list of field names
//! def geo_query(items): ...           # -> row count
//! def get_shape(): ...                # -> 0 or 1 rows, row id in layer.uid
//! def get_geometry(row): ...          # -> [[x, y, x, y, ...], ...]
//! def get_attributes(row): ...        # -> one value per declared item
//! def layer_close(): ...               # optional, best-effort
//! ```
//!
//! Before a procedure runs, the adapter publishes the layer context onto a
//! `layer` namespace object (`layer.data`, `layer.name`, `layer.type`, the
//! query `layer.rectangle`, the row `layer.uid`, ...), and a `meta` command
//! gives scripts read/write access to the layer's metadata table.

mod command;
pub mod error;
pub mod interpreter;
mod marshal;
mod meta;
pub mod source;
pub mod timefilter;

pub use error::{PyLayerError, PyLayerResult};
pub use interpreter::ScriptEnv;
pub use source::PyLayerSource;
