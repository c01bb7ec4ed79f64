use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{RawRow, Role, RoleMapping};
use crate::normalize::normalize_row;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Upserts raw rows by issue key. Rows without a key get a generated one.
pub async fn import_rows(pool: &PgPool, rows: &[RawRow]) -> anyhow::Result<usize> {
    let batch = Uuid::new_v4();
    let mut imported = 0usize;

    for row in rows {
        let record = normalize_row(row);
        let issue_key = if record.issue_key.is_empty() {
            format!("import-{}", Uuid::new_v4())
        } else {
            record.issue_key.clone()
        };

        let reference_at = record.reference_time();
        let mut payload: serde_json::Map<String, Value> = record.raw.into_iter().collect();
        payload.insert("issue_key".to_string(), Value::String(issue_key.clone()));

        let result = sqlx::query(
            r#"
            INSERT INTO conversation_quality.conversations
            (issue_key, payload, reference_at, import_batch)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (issue_key) DO UPDATE
            SET payload = EXCLUDED.payload,
                reference_at = EXCLUDED.reference_at,
                import_batch = EXCLUDED.import_batch,
                imported_at = now()
            "#,
        )
        .bind(&issue_key)
        .bind(Value::Object(payload))
        .bind(reference_at)
        .bind(batch)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            imported += 1;
        }
    }

    info!(%batch, imported, "imported conversation rows");
    Ok(imported)
}

pub async fn fetch_rows(pool: &PgPool, since: DateTime<Utc>) -> anyhow::Result<Vec<RawRow>> {
    let records = sqlx::query(
        r#"
        SELECT payload
        FROM conversation_quality.conversations
        WHERE reference_at >= $1
        ORDER BY reference_at, issue_key
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut rows: Vec<RawRow> = Vec::with_capacity(records.len());
    for record in records {
        let payload: Value = record.get("payload");
        if let Value::Object(map) = payload {
            rows.push(map.into_iter().collect());
        }
    }

    debug!(rows = rows.len(), %since, "fetched conversation rows");
    Ok(rows)
}

/// Replaces the stored mapping wholesale.
pub async fn replace_roles(pool: &PgPool, mapping: &RoleMapping) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM conversation_quality.agent_roles")
        .execute(&mut *tx)
        .await?;

    for (participant, role) in mapping.iter() {
        sqlx::query(
            "INSERT INTO conversation_quality.agent_roles (participant_id, role) VALUES ($1, $2)",
        )
        .bind(participant)
        .bind(role.storage_label())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(mapping.len())
}

/// Upserts entries; participants absent from `mapping` keep their stored role.
pub async fn merge_roles(pool: &PgPool, mapping: &RoleMapping) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;
    for (participant, role) in mapping.iter() {
        sqlx::query(
            r#"
            INSERT INTO conversation_quality.agent_roles (participant_id, role)
            VALUES ($1, $2)
            ON CONFLICT (participant_id) DO UPDATE
            SET role = EXCLUDED.role, updated_at = now()
            "#,
        )
        .bind(participant)
        .bind(role.storage_label())
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(mapping.len())
}

pub async fn fetch_roles(pool: &PgPool) -> anyhow::Result<RoleMapping> {
    let records = sqlx::query("SELECT participant_id, role FROM conversation_quality.agent_roles")
        .fetch_all(pool)
        .await?;

    let mapping: RoleMapping = records
        .into_iter()
        .filter_map(|record| {
            let participant: String = record.get("participant_id");
            let label: String = record.get("role");
            Role::parse_label(&label).map(|role| (participant, role))
        })
        .collect();
    Ok(mapping)
}
