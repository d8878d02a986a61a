use sqlx::{PgPool, Row};

use crate::models::scan::{NutritionRecord, ScanRow};

/// Insert a completed scan, returning its id. The flag list is stored
/// comma-joined alongside the full record for cheap filtering.
pub async fn insert_scan(
    pool: &PgPool,
    user_id: i64,
    image_url: &str,
    record: &NutritionRecord,
) -> Result<i64, sqlx::Error> {
    let record_json =
        serde_json::to_value(record).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    let flags = record.flags.join(",");

    let row = sqlx::query(
        r#"
        INSERT INTO nutrition_scans (user_id, image_url, record, flags)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(image_url)
    .bind(record_json)
    .bind(flags)
    .fetch_one(pool)
    .await?;

    row.try_get("id")
}

/// Fetch one scan by id
pub async fn get_scan(pool: &PgPool, id: i64) -> Result<Option<ScanRow>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, image_url, record, flags, created_at
        FROM nutrition_scans
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(scan_row).transpose()
}

/// Most recent scans for a user, newest first
pub async fn recent_scans(
    pool: &PgPool,
    user_id: i64,
    limit: i64,
) -> Result<Vec<ScanRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, image_url, record, flags, created_at
        FROM nutrition_scans
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(scan_row).collect()
}

fn scan_row(row: sqlx::postgres::PgRow) -> Result<ScanRow, sqlx::Error> {
    Ok(ScanRow {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        image_url: row.try_get("image_url")?,
        record: row.try_get("record")?,
        flags: row.try_get("flags")?,
        created_at: row.try_get("created_at")?,
    })
}
