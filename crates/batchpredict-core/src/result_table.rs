//! Result-table planner.
//!
//! Before inference the destination table is recreated with the columns of
//! the prediction query plus the result column. The label column the model
//! was trained on is not copied; its type becomes the result column type.

use batchpredict_store::{SqlDatabase, SqlField, StorageError};
use serde::Serialize;
use tracing::info;

/// Result column type when the query carries no label (clustering models).
pub const DEFAULT_RESULT_TYPE: &str = "INT";

const HIVE_TABLE_SUFFIX: &str = r#"ROW FORMAT DELIMITED FIELDS TERMINATED BY "\001" STORED AS TEXTFILE;"#;

#[derive(Debug, thiserror::Error)]
pub enum ResultTableError {
    #[error("unsupported field type {type_name} for driver {driver}")]
    UnsupportedType { driver: String, type_name: String },

    #[error("unsupported driver {0}")]
    UnsupportedDriver(String),

    #[error("failed to read field types of the prediction query: {0}")]
    FieldTypes(#[source] StorageError),

    #[error("failed executing {statement}: {source}")]
    Exec {
        statement: String,
        #[source]
        source: StorageError,
    },
}

/// Statements that recreate a result table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultTablePlan {
    pub drop_statement: String,
    pub create_statement: String,
    pub result_column_type: String,
}

/// Map a query field type to the column type `driver` stores it as.
pub fn field_type(driver: &str, type_name: &str) -> Result<String, ResultTableError> {
    let upper = type_name.trim().to_ascii_uppercase();
    let unsupported = || ResultTableError::UnsupportedType {
        driver: driver.to_string(),
        type_name: type_name.to_string(),
    };
    let is_text = upper.starts_with("VARCHAR")
        || upper.starts_with("CHAR")
        || upper == "TEXT"
        || upper == "STRING";

    match driver {
        "mysql" => Ok(type_name.to_string()),
        "hive" => {
            if is_text {
                Ok("STRING".to_string())
            } else {
                match upper.as_str() {
                    "TINYINT" | "SMALLINT" | "INT" | "BIGINT" | "FLOAT" | "DOUBLE" | "BOOLEAN"
                    | "DATE" | "TIMESTAMP" => Ok(upper),
                    _ if upper.starts_with("DECIMAL") => Ok(upper),
                    _ => Err(unsupported()),
                }
            }
        }
        "maxcompute" => {
            if is_text {
                return Ok("STRING".to_string());
            }
            match upper.as_str() {
                "TINYINT" | "SMALLINT" | "INT" | "INTEGER" | "BIGINT" => Ok("BIGINT".to_string()),
                "FLOAT" | "DOUBLE" => Ok("DOUBLE".to_string()),
                _ if upper.starts_with("DECIMAL") => Ok("DOUBLE".to_string()),
                _ => Err(unsupported()),
            }
        }
        other => Err(ResultTableError::UnsupportedDriver(other.to_string())),
    }
}

pub fn drop_statement(result_table: &str) -> String {
    format!("drop table if exists {result_table};")
}

/// Build the drop and create statements for `result_table`.
///
/// `train_label` may be empty when the model's training label is unknown.
pub fn plan_result_table(
    driver: &str,
    fields: &[SqlField],
    result_table: &str,
    train_label: &str,
    result_column: &str,
) -> Result<ResultTablePlan, ResultTableError> {
    let mut columns = Vec::with_capacity(fields.len() + 1);
    let mut result_type: Option<String> = None;

    for field in fields {
        let column_type = field_type(driver, &field.type_name)?;
        let is_label = !train_label.is_empty() && field.name == train_label;
        if is_label || field.name == result_column {
            result_type = Some(column_type);
            continue;
        }
        columns.push(format!("{} {}", field.name, column_type));
    }

    let result_column_type = field_type(
        driver,
        result_type.as_deref().unwrap_or(DEFAULT_RESULT_TYPE),
    )?;
    columns.push(format!("{result_column} {result_column_type}"));

    let mut create_statement = format!("create table {result_table} ({})", columns.join(", "));
    if driver == "hive" {
        create_statement.push(' ');
        create_statement.push_str(HIVE_TABLE_SUFFIX);
    } else {
        create_statement.push(';');
    }

    Ok(ResultTablePlan {
        drop_statement: drop_statement(result_table),
        create_statement,
        result_column_type,
    })
}

/// Drop and recreate `result_table` from the fields of `select`.
pub async fn create_result_table(
    db: &dyn SqlDatabase,
    select: &str,
    result_table: &str,
    train_label: &str,
    result_column: &str,
) -> Result<ResultTablePlan, ResultTableError> {
    let drop = drop_statement(result_table);
    exec(db, &drop).await?;

    let fields = db
        .field_types(select)
        .await
        .map_err(ResultTableError::FieldTypes)?;
    let plan = plan_result_table(db.driver(), &fields, result_table, train_label, result_column)?;
    exec(db, &plan.create_statement).await?;

    info!(
        result_table = %result_table,
        result_column = %result_column,
        result_type = %plan.result_column_type,
        "result table created"
    );
    Ok(plan)
}

async fn exec(db: &dyn SqlDatabase, statement: &str) -> Result<(), ResultTableError> {
    db.exec(statement)
        .await
        .map_err(|source| ResultTableError::Exec {
            statement: statement.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Vec<SqlField> {
        pairs.iter().map(|(n, t)| SqlField::new(*n, *t)).collect()
    }

    #[test]
    fn maxcompute_widens_numeric_types() {
        assert_eq!(field_type("maxcompute", "int").unwrap(), "BIGINT");
        assert_eq!(field_type("maxcompute", "FLOAT").unwrap(), "DOUBLE");
        assert_eq!(field_type("maxcompute", "VARCHAR(255)").unwrap(), "STRING");
        // already-mapped types map to themselves
        assert_eq!(field_type("maxcompute", "BIGINT").unwrap(), "BIGINT");
    }

    #[test]
    fn hive_maps_text_to_string() {
        assert_eq!(field_type("hive", "VARCHAR(10)").unwrap(), "STRING");
        assert_eq!(field_type("hive", "text").unwrap(), "STRING");
        assert_eq!(field_type("hive", "DOUBLE").unwrap(), "DOUBLE");
    }

    #[test]
    fn unknown_types_and_drivers_are_rejected() {
        assert!(matches!(
            field_type("maxcompute", "BLOB"),
            Err(ResultTableError::UnsupportedType { .. })
        ));
        assert!(matches!(
            field_type("sqlite", "INT"),
            Err(ResultTableError::UnsupportedDriver(d)) if d == "sqlite"
        ));
    }

    #[test]
    fn label_column_type_becomes_result_type() {
        let plan = plan_result_table(
            "mysql",
            &fields(&[("sepal_length", "FLOAT"), ("class", "BIGINT")]),
            "iris.predict",
            "class",
            "class",
        )
        .unwrap();

        assert_eq!(plan.drop_statement, "drop table if exists iris.predict;");
        assert_eq!(
            plan.create_statement,
            "create table iris.predict (sepal_length FLOAT, class BIGINT);"
        );
        assert_eq!(plan.result_column_type, "BIGINT");
    }

    #[test]
    fn missing_label_defaults_to_int() {
        let plan = plan_result_table(
            "maxcompute",
            &fields(&[("x", "DOUBLE")]),
            "p.out",
            "",
            "cluster",
        )
        .unwrap();

        assert_eq!(plan.create_statement, "create table p.out (x DOUBLE, cluster BIGINT);");
    }

    #[test]
    fn hive_gets_storage_clause() {
        let plan =
            plan_result_table("hive", &fields(&[("x", "INT")]), "db.out", "y", "y").unwrap();

        assert_eq!(
            plan.create_statement,
            r#"create table db.out (x INT, y INT) ROW FORMAT DELIMITED FIELDS TERMINATED BY "\001" STORED AS TEXTFILE;"#
        );
    }
}
