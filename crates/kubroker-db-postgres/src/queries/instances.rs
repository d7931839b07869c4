//! Queries over the `instances` table.

use chrono::{DateTime, Utc};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;
use time::OffsetDateTime;

use kubroker_core::InstanceRecord;
use kubroker_storage::StorageError;

use crate::error::is_unique_violation;

type InstanceRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

const SELECT_COLUMNS: &str = "instance_id, service_id, service_name, plan_id, instance_name, \
     namespace, organization_guid, space_guid, parameters, manifest, created_at, updated_at";

/// Converts chrono DateTime to time OffsetDateTime.
fn chrono_to_time(dt: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(dt.timestamp()).unwrap_or(OffsetDateTime::UNIX_EPOCH)
        + time::Duration::nanoseconds(i64::from(dt.timestamp_subsec_nanos()))
}

/// Converts time OffsetDateTime to chrono DateTime.
fn time_to_chrono(dt: OffsetDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond()).unwrap_or_default()
}

fn from_row(row: InstanceRow) -> InstanceRecord {
    InstanceRecord {
        instance_id: row.0,
        service_id: row.1,
        service_name: row.2,
        plan_id: row.3,
        instance_name: row.4,
        namespace: row.5,
        organization_guid: row.6,
        space_guid: row.7,
        parameters: row.8,
        manifest: row.9,
        created_at: chrono_to_time(row.10),
        updated_at: chrono_to_time(row.11),
    }
}

pub async fn insert(pool: &PgPool, record: &InstanceRecord) -> Result<(), StorageError> {
    query(
        r#"INSERT INTO instances (instance_id, service_id, service_name, plan_id, instance_name,
               namespace, organization_guid, space_guid, parameters, manifest, created_at, updated_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
    )
    .bind(&record.instance_id)
    .bind(&record.service_id)
    .bind(&record.service_name)
    .bind(&record.plan_id)
    .bind(&record.instance_name)
    .bind(&record.namespace)
    .bind(&record.organization_guid)
    .bind(&record.space_guid)
    .bind(&record.parameters)
    .bind(&record.manifest)
    .bind(time_to_chrono(record.created_at))
    .bind(time_to_chrono(record.updated_at))
    .execute(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            StorageError::already_exists(&record.instance_id)
        } else {
            StorageError::internal(format!("Failed to insert instance: {e}"))
        }
    })?;

    Ok(())
}

pub async fn select(pool: &PgPool, instance_id: &str) -> Result<Option<InstanceRecord>, StorageError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM instances WHERE instance_id = $1");
    let row: Option<InstanceRow> = query_as(&sql)
        .bind(instance_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| StorageError::internal(format!("Failed to read instance: {e}")))?;

    Ok(row.map(from_row))
}

pub async fn update(pool: &PgPool, record: &InstanceRecord) -> Result<(), StorageError> {
    let result = query(
        r#"UPDATE instances
           SET plan_id = $2, parameters = $3, manifest = $4, updated_at = $5
           WHERE instance_id = $1"#,
    )
    .bind(&record.instance_id)
    .bind(&record.plan_id)
    .bind(&record.parameters)
    .bind(&record.manifest)
    .bind(time_to_chrono(record.updated_at))
    .execute(pool)
    .await
    .map_err(|e| StorageError::internal(format!("Failed to update instance: {e}")))?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(&record.instance_id));
    }
    Ok(())
}

pub async fn delete(pool: &PgPool, instance_id: &str) -> Result<bool, StorageError> {
    let result = query("DELETE FROM instances WHERE instance_id = $1")
        .bind(instance_id)
        .execute(pool)
        .await
        .map_err(|e| StorageError::internal(format!("Failed to delete instance: {e}")))?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_conversion_roundtrip() {
        let now = OffsetDateTime::now_utc();
        let back = chrono_to_time(time_to_chrono(now));
        assert_eq!(back.unix_timestamp_nanos(), now.unix_timestamp_nanos());
    }
}
