use std::io::Read;
use std::path::Path;

use anyhow::Context;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::DashboardError;
use crate::models::{RawRow, Role, RoleMapping};

const ROLE_ID_COLUMNS: [&str; 2] = ["user_id", "participant_id"];
const ROLE_LABEL_COLUMNS: [&str; 2] = ["port_role", "role"];

pub fn read_rows(csv_path: &Path) -> anyhow::Result<Vec<RawRow>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = parse_rows(file)
        .with_context(|| format!("failed to parse {}", csv_path.display()))?;
    debug!(path = %csv_path.display(), rows = rows.len(), "read conversation rows");
    Ok(rows)
}

/// Every cell becomes a JSON string. Duplicate headers keep the first non-empty cell.
pub fn parse_rows<R: Read>(input: R) -> Result<Vec<RawRow>, DashboardError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let mut row = RawRow::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            if header.is_empty() {
                continue;
            }
            let cell = cell.trim();
            let keep_existing = row
                .get(header)
                .and_then(Value::as_str)
                .is_some_and(|existing| !existing.is_empty());
            if !keep_existing {
                row.insert(header.clone(), Value::String(cell.to_string()));
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

pub fn read_role_mapping(csv_path: &Path) -> anyhow::Result<RoleMapping> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mapping = parse_role_mapping(file, &csv_path.display().to_string())?;
    debug!(path = %csv_path.display(), entries = mapping.len(), "read role mapping");
    Ok(mapping)
}

/// Reads `user_id,port_role` style role assignments; rows with unknown labels are skipped.
pub fn parse_role_mapping<R: Read>(
    input: R,
    source_name: &str,
) -> Result<RoleMapping, DashboardError> {
    let mut reader = csv::Reader::from_reader(input);
    let headers = reader.headers()?.clone();
    let position = |candidates: &[&str]| {
        headers
            .iter()
            .position(|header| candidates.contains(&header.trim().to_ascii_lowercase().as_str()))
    };

    let (Some(id_index), Some(role_index)) =
        (position(&ROLE_ID_COLUMNS), position(&ROLE_LABEL_COLUMNS))
    else {
        return Err(DashboardError::MissingColumns {
            source_name: source_name.to_string(),
            columns: format!(
                "one of {} and one of {}",
                ROLE_ID_COLUMNS.join("/"),
                ROLE_LABEL_COLUMNS.join("/")
            ),
        });
    };

    let mut mapping = RoleMapping::new();
    for result in reader.records() {
        let record = result?;
        let participant = record.get(id_index).unwrap_or_default().trim();
        if participant.is_empty() {
            continue;
        }
        let label = record.get(role_index).unwrap_or_default();
        match Role::parse_label(label) {
            Some(role) => mapping.insert(participant, role),
            None => warn!(participant, label, "skipping unknown role label"),
        }
    }
    Ok(mapping)
}
