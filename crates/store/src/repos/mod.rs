//! Repository traits for the aggregation store.

pub mod antennas;
pub mod gateways;
pub mod grid_cells;
pub mod observations;

pub use antennas::AntennaRepo;
pub use gateways::GatewayRepo;
pub use grid_cells::GridCellRepo;
pub use observations::ObservationRepo;
