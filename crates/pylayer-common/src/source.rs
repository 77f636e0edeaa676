use crate::error::EngineResult;
use crate::geometry::{Rect, Shape};

/// The outcome of a random-access shape lookup. End-of-data and not-found
/// are ordinary statuses, never errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeLookup {
    Found(Shape),
    /// The backend positioned a row but it carried no usable geometry.
    NotFound,
    /// The backend reported no row for the requested identifier.
    EndOfData,
}

/// The engine-side seam a vector data source implements.
///
/// All operations are synchronous blocking round-trips: the engine's
/// single-threaded rendering pipeline drives one operation at a time and
/// each returns before the next begins.
pub trait VectorSource {
    /// Open the layer. Opening an already open layer succeeds.
    fn open(&mut self) -> EngineResult<()>;

    fn is_open(&self) -> bool;

    /// Run the spatial query for `rect` and reset iteration state.
    fn which_shapes(&mut self, rect: Rect) -> EngineResult<()>;

    /// Produce the next drawable shape, or `None` once the result set is
    /// exhausted. Exhaustion is terminal and idempotent.
    fn next_shape(&mut self) -> EngineResult<Option<Shape>>;

    /// Fetch a single shape by row identifier.
    fn get_shape(&mut self, record: i64) -> EngineResult<ShapeLookup>;

    /// Ask the backend for the layer's item schema and install it.
    fn get_items(&mut self) -> EngineResult<Vec<String>>;

    /// The layer extent; sources that cannot compute one precisely report
    /// an effectively unbounded rectangle.
    fn get_extent(&mut self) -> EngineResult<Rect>;

    /// Synthesize and install a temporal filter expression. Returns false
    /// when the time specification cannot be interpreted.
    fn set_time_filter(&mut self, timestring: &str, timefield: &str) -> EngineResult<bool>;

    /// Close the layer and release per-layer state. Closing a closed layer
    /// is a no-op.
    fn close(&mut self);
}
