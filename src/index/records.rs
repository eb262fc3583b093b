//! Typed rows of the three reference files.

use serde::{Deserialize, Deserializer, Serialize};

/// One row of `TableAttribute.csv`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    #[serde(rename = "SchemaName")]
    pub schema_name: String,

    #[serde(rename = "TableName")]
    pub table_name: String,

    #[serde(rename = "Description", default)]
    pub description: String,

    #[serde(rename = "SystemFlag", default, deserialize_with = "de_flag")]
    pub system_flag: bool,

    #[serde(rename = "AutoIMWriteTrigger", default, deserialize_with = "de_flag")]
    pub write_trigger_flag: bool,

    #[serde(rename = "AutoIMDeleteTrigger", default, deserialize_with = "de_flag")]
    pub delete_trigger_flag: bool,

    #[serde(rename = "SysRevID", default)]
    pub revision_id: String,

    #[serde(rename = "SysRowID", default)]
    pub row_id: String,

    #[serde(rename = "LastUpdated", default)]
    pub last_updated: String,
}

impl TableDescriptor {
    /// `Schema.Table`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.table_name)
    }
}

/// One row of `QueryRelation.csv`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationRecord {
    #[serde(rename = "Company", default)]
    pub company_id: String,

    #[serde(rename = "QueryID", default)]
    pub query_id: String,

    #[serde(rename = "SubQueryID", default)]
    pub sub_query_id: String,

    #[serde(rename = "RelationID")]
    pub relation_id: String,

    #[serde(rename = "IsForeignKey", default, deserialize_with = "de_flag")]
    pub is_foreign_key: bool,

    #[serde(rename = "ParentTable")]
    pub parent_table: String,

    #[serde(rename = "ChildTable")]
    pub child_table: String,

    #[serde(rename = "JoinType", default)]
    pub join_type: String,

    #[serde(rename = "SystemFlag", default, deserialize_with = "de_flag")]
    pub system_flag: bool,
}

/// One row of `QueryRelationField.csv`.
///
/// The file repeats the `FieldName`/`FieldType` headers for the parent and
/// child sides, so rows are read by position rather than by header.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RelationFieldRecord {
    pub relation_id: String,
    pub sequence: i64,
    pub parent_field: String,
    pub parent_field_type: String,
    pub child_field: String,
    pub child_field_type: String,
    pub connective: String,
    pub negate: bool,
    pub comparison_operator: String,
}

/// Parse a reference-file flag. Empty means false.
pub fn parse_flag(raw: &str) -> Result<bool, String> {
    match raw.trim().to_lowercase().as_str() {
        "" | "false" | "0" | "no" | "n" => Ok(false),
        "true" | "1" | "yes" | "y" => Ok(true),
        other => Err(format!("invalid boolean flag '{}'", other)),
    }
}

fn de_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_flag(&raw).map_err(serde::de::Error::custom)
}

/// Table name without any schema prefix, in its original casing.
pub fn unqualified(name: &str) -> &str {
    let trimmed = name.trim();
    trimmed.rsplit('.').next().unwrap_or(trimmed)
}

/// Case-insensitive lookup key for a possibly schema-qualified table name.
pub fn table_key(name: &str) -> String {
    unqualified(name).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        for raw in ["true", "TRUE", "1", "yes", "Y", " y "] {
            assert_eq!(parse_flag(raw), Ok(true), "{}", raw);
        }
        for raw in ["false", "False", "0", "no", "N", ""] {
            assert_eq!(parse_flag(raw), Ok(false), "{}", raw);
        }
        assert!(parse_flag("maybe").is_err());
    }

    #[test]
    fn test_table_key() {
        assert_eq!(table_key("Erp.Customer"), "customer");
        assert_eq!(table_key("OrderHed"), "orderhed");
        assert_eq!(table_key(" Erp.ShipTo "), "shipto");
        assert_eq!(unqualified("Erp.OrderDtl"), "OrderDtl");
    }

    #[test]
    fn test_qualified_name() {
        let table = TableDescriptor {
            schema_name: "Erp".into(),
            table_name: "Customer".into(),
            ..Default::default()
        };
        assert_eq!(table.qualified_name(), "Erp.Customer");
    }
}
