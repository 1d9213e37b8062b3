//! Slippy-map tile indexing at the fixed coverage zoom level.

use std::f64::consts::PI;
use thiserror::Error;

/// Zoom level of the coverage grid.
///
/// At zoom 19 a tile is roughly 50-75 m wide in the mid latitudes, which is
/// on the order of the GPS error of typical mapper devices; a coarser zoom
/// would merge disjoint streets into one cell.
pub const COVERAGE_ZOOM: u32 = 19;

/// The Web-Mercator projection only covers about 85.05 degrees of latitude;
/// tile indices outside this band are undefined.
pub const MAX_ABS_LATITUDE: f64 = 85.0;

/// Reasons a coordinate pair cannot be placed on the coverage grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CoordinateError {
    #[error("latitude outside the +-85 degree Mercator band")]
    OutOfRange,
    /// The exact (0, 0) pair is the "no fix" placeholder, never a real
    /// location.
    #[error("null island (0, 0) placeholder coordinates")]
    NullIsland,
}

/// A tile coordinate at [`COVERAGE_ZOOM`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    pub x: i64,
    pub y: i64,
}

/// Reject coordinates the projection cannot handle.
///
/// Every caller of [`tile_at`] must gate on this first: the projection has
/// no inverse near the poles, and (0, 0) readings are unset GPS fixes.
pub fn check_coordinates(latitude: f64, longitude: f64) -> Result<(), CoordinateError> {
    if !(-MAX_ABS_LATITUDE..=MAX_ABS_LATITUDE).contains(&latitude) {
        return Err(CoordinateError::OutOfRange);
    }
    if latitude == 0.0 && longitude == 0.0 {
        return Err(CoordinateError::NullIsland);
    }
    Ok(())
}

/// Project a coordinate onto the zoom-19 tile grid.
///
/// Standard spherical Web-Mercator tile formula. Deterministic, no side
/// effects. Input must already have passed [`check_coordinates`].
pub fn tile_at(latitude: f64, longitude: f64) -> Tile {
    let n = f64::from(1u32 << COVERAGE_ZOOM);
    let lat_rad = latitude.to_radians();

    let x = ((longitude + 180.0) / 360.0 * n).floor() as i64;
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor() as i64;

    Tile { x, y }
}
