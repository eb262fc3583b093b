//! CSV loading for the reference files.
//!
//! Each file is loaded independently. A file that is missing or contains a
//! malformed row yields an empty collection for that file only.

use super::records::{parse_flag, RelationFieldRecord, RelationRecord, TableDescriptor};
use crate::config::ReferenceConfig;
use serde::de::DeserializeOwned;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Failure to load one reference file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("malformed row in {path}: {source}")]
    Row {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("malformed row {line} in {path}: {message}")]
    Field {
        path: String,
        line: u64,
        message: String,
    },
}

/// Contents of the three reference files.
#[derive(Debug, Default, Clone)]
pub struct ReferenceData {
    pub tables: Vec<TableDescriptor>,
    pub relations: Vec<RelationRecord>,
    pub relation_fields: Vec<RelationFieldRecord>,
}

fn reader(path: &Path) -> Result<csv::Reader<std::fs::File>, LoadError> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|source| LoadError::Open {
            path: path.display().to_string(),
            source,
        })
}

fn load_by_header<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, LoadError> {
    let mut rdr = reader(path)?;
    rdr.deserialize()
        .map(|row| {
            row.map_err(|source| LoadError::Row {
                path: path.display().to_string(),
                source,
            })
        })
        .collect()
}

/// Load `TableAttribute.csv`.
pub fn load_tables(path: &Path) -> Result<Vec<TableDescriptor>, LoadError> {
    load_by_header(path)
}

/// Load `QueryRelation.csv`.
pub fn load_relations(path: &Path) -> Result<Vec<RelationRecord>, LoadError> {
    load_by_header(path)
}

/// Load `QueryRelationField.csv` by column position.
pub fn load_relation_fields(path: &Path) -> Result<Vec<RelationFieldRecord>, LoadError> {
    let mut rdr = reader(path)?;
    let display = path.display().to_string();
    let mut fields = Vec::new();

    for row in rdr.records() {
        let record = row.map_err(|source| LoadError::Row {
            path: display.clone(),
            source,
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let field_error = |message: String| LoadError::Field {
            path: display.clone(),
            line,
            message,
        };
        let col = |i: usize| record.get(i).unwrap_or("").to_string();

        if record.len() < 5 {
            return Err(field_error(format!(
                "expected at least 5 columns, found {}",
                record.len()
            )));
        }

        let relation_id = col(0);
        if relation_id.is_empty() {
            return Err(field_error("empty RelationID".to_string()));
        }

        let raw_seq = col(1);
        let sequence = raw_seq
            .parse::<i64>()
            .map_err(|_| field_error(format!("invalid Seq '{}'", raw_seq)))?;
        let negate = parse_flag(&col(7)).map_err(field_error)?;

        fields.push(RelationFieldRecord {
            relation_id,
            sequence,
            parent_field: col(2),
            parent_field_type: col(3),
            child_field: col(4),
            child_field_type: col(5),
            connective: col(6),
            negate,
            comparison_operator: col(8),
        });
    }

    Ok(fields)
}

fn isolate<T>(kind: &str, path: &Path, result: Result<Vec<T>, LoadError>) -> Vec<T> {
    match result {
        Ok(rows) => {
            info!("Loaded {} {} from {}", rows.len(), kind, path.display());
            rows
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to load {}; continuing without them", kind);
            Vec::new()
        }
    }
}

/// Load all three files, isolating failures per file.
pub fn load_reference_data(config: &ReferenceConfig) -> ReferenceData {
    ReferenceData {
        tables: isolate(
            "tables",
            &config.tables_file,
            load_tables(&config.tables_file),
        ),
        relations: isolate(
            "relations",
            &config.relations_file,
            load_relations(&config.relations_file),
        ),
        relation_fields: isolate(
            "relation fields",
            &config.relation_fields_file,
            load_relation_fields(&config.relation_fields_file),
        ),
    }
}
