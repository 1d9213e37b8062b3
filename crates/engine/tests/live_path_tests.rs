//! Live observation path: gates, fan-out isolation, cell updates.

mod common;

use common::{report, uplink, Harness};
use gridcover_core::tile::{tile_at, CoordinateError};
use gridcover_engine::{DiscardReason, ReportOutcome};
use time::macros::datetime;

const NET: &str = "NS_TTS_V3://ttn@000013";
const GW: &str = "eui-a84041ffff1e2b3c";

// Amsterdam; observations in the tests sit a couple of kilometers away.
const GW_LAT: f64 = 52.3;
const GW_LON: f64 = 4.9;

#[tokio::test]
async fn three_observations_fill_three_buckets() {
    let harness = Harness::new().await;
    harness.seed_gateway(NET, GW, Some(GW_LAT), Some(GW_LON)).await;

    let at = datetime!(2024-06-01 10:00:00 UTC);
    for (index, rssi) in [-90.0_f32, -96.0, -150.0].into_iter().enumerate() {
        let message = uplink(52.301, 4.901, at + time::Duration::minutes(index as i64), vec![
            report(NET, GW, rssi, 0.0),
        ]);
        let outcomes = harness.live.apply(&message).await;
        assert!(outcomes[0].is_updated(), "observation {index}: {:?}", outcomes[0]);
    }

    let antenna = harness.store.find_or_create_antenna(NET, GW, 0).await.unwrap();
    let cells = harness.store.cells_for_antenna(antenna.id).await.unwrap();
    assert_eq!(cells.len(), 1);

    let cell = &cells[0];
    assert_eq!(cell.bucket_high, 1);
    assert_eq!(cell.bucket_100, 1);
    assert_eq!(cell.bucket_low, 1);
    let total: i64 = cell.bucket_high
        + cell.bucket_100
        + cell.bucket_105
        + cell.bucket_110
        + cell.bucket_115
        + cell.bucket_120
        + cell.bucket_125
        + cell.bucket_130
        + cell.bucket_135
        + cell.bucket_140
        + cell.bucket_145
        + cell.bucket_low
        + cell.bucket_no_signal;
    assert_eq!(total, 3);
}

#[tokio::test]
async fn experiment_traffic_never_reaches_the_grid() {
    let harness = Harness::new().await;
    harness.seed_gateway(NET, GW, Some(GW_LAT), Some(GW_LON)).await;

    let mut message = uplink(52.301, 4.901, datetime!(2024-06-01 10:00:00 UTC), vec![
        report(NET, GW, -90.0, 0.0),
    ]);
    message.experiment = "experiment_2024_range_test".to_string();

    let outcomes = harness.live.apply(&message).await;
    assert!(matches!(
        outcomes[0],
        ReportOutcome::Discarded(DiscardReason::Experiment)
    ));

    let antenna = harness.store.find_or_create_antenna(NET, GW, 0).await.unwrap();
    assert!(harness.store.cells_for_antenna(antenna.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_fix_is_discarded() {
    let harness = Harness::new().await;
    harness.seed_gateway(NET, GW, Some(GW_LAT), Some(GW_LON)).await;

    let message = uplink(0.0, 0.0, datetime!(2024-06-01 10:00:00 UTC), vec![
        report(NET, GW, -90.0, 0.0),
    ]);

    let outcomes = harness.live.apply(&message).await;
    assert!(matches!(
        outcomes[0],
        ReportOutcome::Discarded(DiscardReason::NoFix)
    ));
}

#[tokio::test]
async fn unknown_gateway_is_discarded() {
    let harness = Harness::new().await;

    let message = uplink(52.301, 4.901, datetime!(2024-06-01 10:00:00 UTC), vec![
        report(NET, "eui-never-seen", -90.0, 0.0),
    ]);

    let outcomes = harness.live.apply(&message).await;
    assert!(matches!(
        outcomes[0],
        ReportOutcome::Discarded(DiscardReason::OutOfRange)
    ));
}

#[tokio::test]
async fn null_island_gateway_rejects_everything() {
    let harness = Harness::new().await;
    harness.seed_gateway(NET, GW, Some(0.0), Some(0.0)).await;

    // Even an observation "at" the gateway is rejected: a (0, 0) gateway
    // location is unset, and distance from an unset location means nothing.
    for (lat, lon) in [(0.0001, 0.0001), (52.301, 4.901)] {
        let message = uplink(lat, lon, datetime!(2024-06-01 10:00:00 UTC), vec![
            report(NET, GW, -90.0, 0.0),
        ]);
        let outcomes = harness.live.apply(&message).await;
        assert!(matches!(
            outcomes[0],
            ReportOutcome::Discarded(DiscardReason::OutOfRange)
        ));
    }
}

#[tokio::test]
async fn distant_observation_is_discarded() {
    let harness = Harness::new().await;
    harness.seed_gateway(NET, GW, Some(GW_LAT), Some(GW_LON)).await;

    // Paris is ~430 km from the gateway, far over the 100 km limit.
    let message = uplink(48.853, 2.35, datetime!(2024-06-01 10:00:00 UTC), vec![
        report(NET, GW, -90.0, 0.0),
    ]);

    let outcomes = harness.live.apply(&message).await;
    assert!(matches!(
        outcomes[0],
        ReportOutcome::Discarded(DiscardReason::OutOfRange)
    ));
}

#[tokio::test]
async fn polar_fix_is_discarded_as_invalid_coordinates() {
    let harness = Harness::new().await;
    // Gateway just inside the projectable band, fix just outside it but
    // within radio range.
    harness.seed_gateway(NET, GW, Some(84.9), Some(10.0)).await;

    let message = uplink(85.5, 10.0, datetime!(2024-06-01 10:00:00 UTC), vec![
        report(NET, GW, -90.0, 0.0),
    ]);

    let outcomes = harness.live.apply(&message).await;
    assert!(matches!(
        outcomes[0],
        ReportOutcome::Discarded(DiscardReason::Coordinates(CoordinateError::OutOfRange))
    ));
}

#[tokio::test]
async fn one_failing_gateway_does_not_block_the_others() {
    let harness = Harness::new().await;
    harness.seed_gateway(NET, GW, Some(GW_LAT), Some(GW_LON)).await;

    // Second report references a gateway nobody knows.
    let message = uplink(52.301, 4.901, datetime!(2024-06-01 10:00:00 UTC), vec![
        report(NET, GW, -97.0, -1.5),
        report(NET, "eui-unknown", -90.0, 0.0),
    ]);

    let outcomes = harness.live.apply(&message).await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].is_updated());
    assert!(matches!(
        outcomes[1],
        ReportOutcome::Discarded(DiscardReason::OutOfRange)
    ));
}

#[tokio::test]
async fn out_of_order_delivery_keeps_the_newest_timestamp() {
    let harness = Harness::new().await;
    harness.seed_gateway(NET, GW, Some(GW_LAT), Some(GW_LON)).await;

    let newer = datetime!(2024-06-02 10:00:00 UTC);
    let older = datetime!(2024-06-01 10:00:00 UTC);

    for at in [newer, older] {
        let message = uplink(52.301, 4.901, at, vec![report(NET, GW, -90.0, 0.0)]);
        let outcomes = harness.live.apply(&message).await;
        assert!(outcomes[0].is_updated());
    }

    let antenna = harness.store.find_or_create_antenna(NET, GW, 0).await.unwrap();
    let cells = harness.store.cells_for_antenna(antenna.id).await.unwrap();
    assert_eq!(cells.len(), 1);
    assert_eq!(cells[0].bucket_high, 2);
    assert_eq!(cells[0].last_updated, newer);
}

#[tokio::test]
async fn concurrent_observations_share_one_row_per_key() {
    let harness = Harness::new().await;
    harness.seed_gateway(NET, GW, Some(GW_LAT), Some(GW_LON)).await;

    let mut tasks = Vec::new();
    for index in 0..8 {
        let live = harness.live.clone();
        tasks.push(tokio::spawn(async move {
            let at = datetime!(2024-06-01 10:00:00 UTC) + time::Duration::seconds(index);
            let message = uplink(52.301, 4.901, at, vec![report(NET, GW, -90.0, 0.0)]);
            live.apply(&message).await
        }));
    }
    for task in tasks {
        let outcomes = task.await.unwrap();
        assert!(outcomes[0].is_updated());
    }

    // The unique key in the store is the invariant; racing creators must
    // converge on a single row.
    let antenna = harness.store.find_or_create_antenna(NET, GW, 0).await.unwrap();
    let tile = tile_at(52.301, 4.901);
    assert_eq!(harness.rows_for_key(antenna.id, tile.x, tile.y).await, 1);
    assert_eq!(
        harness.store.cells_for_antenna(antenna.id).await.unwrap().len(),
        1
    );
}
