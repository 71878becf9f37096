//! Graph model and execution ordering.
//!
//! A workflow is a list of typed `Node`s joined by directed `Connection`s.
//! Documents arrive in several historical shapes; `GraphDocument::into_graph`
//! normalizes them once into the canonical `Graph` every other module reads.

pub mod model;
pub mod order;

pub use model::{Connection, Graph, GraphDocument, Node, RawConnection};
pub use order::build_order;
