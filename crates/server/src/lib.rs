//! gridcover service library: bus consumers, worker loops, metrics and the
//! operational HTTP surface.

pub mod bus;
pub mod ingest;
pub mod metrics;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
