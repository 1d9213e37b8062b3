//! Live observation path.
//!
//! One uplink message fans out into one run per reporting gateway, each
//! with its own outcome: a failure on one gateway never blocks the others.

use crate::cells::GridCellStore;
use crate::error::{EngineError, EngineResult};
use crate::range::GatewayRangeFilter;
use crate::registry::AntennaRegistry;
use gridcover_core::messages::{ReceptionReport, UplinkMessage};
use gridcover_core::signal::classify;
use gridcover_core::tile::CoordinateError;
use gridcover_store::models::GridCellKey;
use std::sync::Arc;

/// Why a reception report was not folded into the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Experiment traffic never feeds the live map.
    Experiment,
    /// The device reported no GPS fix.
    NoFix,
    /// The gateway is unknown, its location is unset, or the fix is too
    /// far from it.
    OutOfRange,
    /// The fix cannot be placed on the coverage grid.
    Coordinates(CoordinateError),
}

/// Outcome of one reception report within an uplink message.
#[derive(Debug)]
pub enum ReportOutcome {
    /// The report was folded into this grid cell.
    Updated(GridCellKey),
    /// The report was filtered out; expected and frequent.
    Discarded(DiscardReason),
    /// The report failed on a store interaction; siblings are unaffected.
    Failed(EngineError),
}

impl ReportOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, ReportOutcome::Updated(_))
    }
}

/// Applies incoming uplink observations to the coverage grid.
pub struct LiveAggregator {
    registry: Arc<AntennaRegistry>,
    filter: Arc<GatewayRangeFilter>,
    cells: Arc<GridCellStore>,
}

impl LiveAggregator {
    pub fn new(
        registry: Arc<AntennaRegistry>,
        filter: Arc<GatewayRangeFilter>,
        cells: Arc<GridCellStore>,
    ) -> Self {
        Self {
            registry,
            filter,
            cells,
        }
    }

    /// Apply one uplink message, returning one outcome per reception
    /// report.
    pub async fn apply(&self, message: &UplinkMessage) -> Vec<ReportOutcome> {
        if !message.experiment.is_empty() {
            return discard_all(message, DiscardReason::Experiment);
        }
        if !message.has_fix() {
            return discard_all(message, DiscardReason::NoFix);
        }

        let mut outcomes = Vec::with_capacity(message.gateways.len());
        for report in &message.gateways {
            outcomes.push(self.apply_report(message, report).await);
        }
        outcomes
    }

    async fn apply_report(&self, message: &UplinkMessage, report: &ReceptionReport) -> ReportOutcome {
        match self.run_report(message, report).await {
            Ok(outcome) => outcome,
            Err(EngineError::InvalidCoordinate(reason)) => {
                ReportOutcome::Discarded(DiscardReason::Coordinates(reason))
            }
            Err(error) => {
                tracing::warn!(
                    network_id = %report.network_id,
                    gateway_id = %report.gateway_id,
                    error = %error,
                    "Dropping reception report"
                );
                ReportOutcome::Failed(error)
            }
        }
    }

    async fn run_report(
        &self,
        message: &UplinkMessage,
        report: &ReceptionReport,
    ) -> EngineResult<ReportOutcome> {
        let antenna_id = self
            .registry
            .resolve(&report.network_id, &report.gateway_id, report.antenna_index)
            .await?;

        let close_enough = self
            .filter
            .within_range(
                &report.network_id,
                &report.gateway_id,
                message.latitude,
                message.longitude,
            )
            .await?;
        if !close_enough {
            return Ok(ReportOutcome::Discarded(DiscardReason::OutOfRange));
        }

        let mut cell = self
            .cells
            .get_or_create(antenna_id, message.latitude, message.longitude)
            .await?;

        cell.record(classify(report.rssi, report.snr), message.timestamp());

        let key = cell.key();
        self.cells.save(cell).await?;
        Ok(ReportOutcome::Updated(key))
    }
}

fn discard_all(message: &UplinkMessage, reason: DiscardReason) -> Vec<ReportOutcome> {
    message
        .gateways
        .iter()
        .map(|_| ReportOutcome::Discarded(reason))
        .collect()
}
