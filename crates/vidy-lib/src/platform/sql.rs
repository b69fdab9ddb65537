//! SQL statement rendering for the platform's query endpoint

use super::{PlatformError, PlatformResult};
use crate::models::{CommentQuery, DataSourceSpec, ModelSpec};
use serde_json::{Map, Value};

/// Table exposed by the YouTube connector
pub const COMMENTS_TABLE: &str = "get_comments";

/// Columns selected from the comments table
pub const COMMENT_COLUMNS: &str = "display_name, username, comment";

/// Quote a string literal, doubling embedded single quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Validate an identifier (project, database, model or column name)
pub fn identifier(name: &str) -> PlatformResult<&str> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(PlatformError::InvalidIdentifier(name.to_string()))
    }
}

/// Render a JSON value as an option value in a `USING` clause
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_literal(s),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", rendered.join(", "))
        }
        Value::Object(_) => value.to_string(),
    }
}

fn render_options(options: &Map<String, Value>) -> PlatformResult<String> {
    let mut parts = Vec::with_capacity(options.len());
    for (key, value) in options {
        parts.push(format!("{} = {}", identifier(key)?, render_value(value)));
    }
    Ok(parts.join(", "))
}

pub fn find_project(name: &str) -> String {
    format!(
        "SELECT NAME FROM information_schema.databases WHERE TYPE = 'project' AND NAME = {}",
        quote_literal(name)
    )
}

pub fn create_project(name: &str) -> PlatformResult<String> {
    Ok(format!("CREATE PROJECT {}", identifier(name)?))
}

pub fn find_database(name: &str) -> String {
    format!(
        "SELECT NAME, ENGINE FROM information_schema.databases WHERE TYPE = 'data' AND NAME = {}",
        quote_literal(name)
    )
}

pub fn create_database(spec: &DataSourceSpec) -> PlatformResult<String> {
    let parameters = Value::Object(spec.parameters.clone());
    Ok(format!(
        "CREATE DATABASE {} WITH ENGINE = {}, PARAMETERS = {}",
        identifier(&spec.name)?,
        quote_literal(&spec.engine),
        parameters
    ))
}

pub fn find_model(project: &str, name: &str) -> String {
    format!(
        "SELECT NAME, PREDICT, STATUS, ERROR FROM information_schema.models WHERE PROJECT = {} AND NAME = {}",
        quote_literal(project),
        quote_literal(name)
    )
}

pub fn create_model(project: &str, spec: &ModelSpec) -> PlatformResult<String> {
    let mut options = Map::new();
    options.insert("engine".to_string(), Value::String(spec.engine.clone()));
    options.extend(spec.options.clone());

    Ok(format!(
        "CREATE MODEL {}.{} PREDICT {} USING {}",
        identifier(project)?,
        identifier(&spec.name)?,
        identifier(&spec.predict)?,
        render_options(&options)?
    ))
}

/// Selection of comments for one video, used directly and as a subquery
pub fn select_comments(database: &str, query: &CommentQuery) -> PlatformResult<String> {
    Ok(format!(
        "SELECT {} FROM {}.{} WHERE youtube_video_id = {} LIMIT {}",
        COMMENT_COLUMNS,
        identifier(database)?,
        COMMENTS_TABLE,
        quote_literal(&query.video_id),
        query.limit
    ))
}

/// Join the comment view with a model to get one prediction per comment
pub fn predict_comments(
    project: &str,
    model: &str,
    database: &str,
    query: &CommentQuery,
) -> PlatformResult<String> {
    Ok(format!(
        "SELECT * FROM ({}) AS t JOIN {}.{} AS m",
        select_comments(database, query)?,
        identifier(project)?,
        identifier(model)?
    ))
}

/// Single-row prediction with inputs given as `WHERE` equalities
pub fn predict_row(
    project: &str,
    model: &str,
    inputs: &Map<String, Value>,
) -> PlatformResult<String> {
    let mut conditions = Vec::with_capacity(inputs.len());
    for (key, value) in inputs {
        conditions.push(format!("{} = {}", identifier(key)?, render_value(value)));
    }

    let mut statement = format!("SELECT * FROM {}.{}", identifier(project)?, identifier(model)?);
    if !conditions.is_empty() {
        statement.push_str(" WHERE ");
        statement.push_str(&conditions.join(" AND "));
    }
    Ok(statement)
}
