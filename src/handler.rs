use log::{debug, info};

use crate::config::{HandlerConfig, Settings};
use crate::db::{Connection, Connector, InsertStatement, MetricRow, Transaction};
use crate::error::{HandlerError, Result};
use crate::event::{Event, MetricPoint};

/// Runs one event through the harness steps after it has been read: event
/// validation, annotation overrides, configuration validation and the insert.
///
/// Configuration is validated before the connector is touched, so a bad
/// configuration never reaches the database.
pub async fn process_event<C, F>(
    connector: &C,
    mut config: HandlerConfig,
    event: &Event,
    env: F,
) -> Result<usize>
where
    C: Connector,
    F: Fn(&str) -> Option<String>,
{
    event.validate()?;
    config.apply_annotations(event);
    let settings = config.validate_with_env(env)?;
    handle_event(connector, &settings, event).await
}

/// Inserts every metric point of `event` into the configured table as one
/// batch and returns the number of rows written.
///
/// The first failure aborts the batch: nothing is committed and the
/// transaction is dropped, which discards the rows executed so far.
pub async fn handle_event<C: Connector>(
    connector: &C,
    settings: &Settings,
    event: &Event,
) -> Result<usize> {
    let conn = connector
        .connect(&settings.endpoint)
        .await
        .map_err(HandlerError::Connection)?;

    let mut tx = conn.begin().await.map_err(HandlerError::Transaction)?;

    let statement = InsertStatement::new(&settings.table);
    tx.prepare(&statement)
        .await
        .map_err(HandlerError::Prepare)?;

    let points = event.points();
    for (index, point) in points.iter().enumerate() {
        let row = to_row(point)?;
        tx.execute(&row)
            .await
            .map_err(|source| HandlerError::Execution {
                index,
                metric: point.name.clone(),
                source,
            })?;
    }
    debug!("Executed {} inserts, committing", points.len());

    tx.commit().await.map_err(HandlerError::Commit)?;

    info!("Inserted {} metric points into {}", points.len(), settings.table);
    Ok(points.len())
}

fn to_row(point: &MetricPoint) -> Result<MetricRow> {
    let tags = point
        .tags_json()
        .map_err(|source| HandlerError::Serialization {
            metric: point.name.clone(),
            source,
        })?;
    Ok(MetricRow {
        ts: point.timestamp,
        metric: point.name.clone(),
        value: point.value,
        tags,
    })
}
