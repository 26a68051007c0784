//! Read-only accessors over unstructured Kubernetes objects.
//!
//! Every accessor tolerates missing or mistyped fields and falls back to an
//! empty value.

use serde_json::Value;

pub fn value_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(key))
}

pub fn str_at<'a>(value: &'a Value, path: &[&str]) -> &'a str {
    value_at(value, path).and_then(Value::as_str).unwrap_or("")
}

pub fn array_at<'a>(value: &'a Value, path: &[&str]) -> &'a [Value] {
    value_at(value, path)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub fn i64_at(value: &Value, path: &[&str]) -> Option<i64> {
    let v = value_at(value, path)?;
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

pub fn name(object: &Value) -> &str {
    str_at(object, &["metadata", "name"])
}

pub fn namespace(object: &Value) -> &str {
    str_at(object, &["metadata", "namespace"])
}

pub fn label<'a>(object: &'a Value, key: &str) -> &'a str {
    str_at(object, &["metadata", "labels", key])
}

pub fn kind(object: &Value) -> &str {
    str_at(object, &["kind"])
}

fn names(containers: &[Value]) -> Vec<String> {
    containers
        .iter()
        .filter_map(|c| c.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// `(containers, initContainers)` names of a pod spec.
pub fn container_names(pod_spec: &Value) -> (Vec<String>, Vec<String>) {
    (
        names(array_at(pod_spec, &["containers"])),
        names(array_at(pod_spec, &["initContainers"])),
    )
}

/// One row of a list response in `meta.k8s.io/v1 Table` form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRow {
    pub cells: Vec<String>,
    pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl Table {
    pub fn parse(value: &Value) -> Self {
        let columns = array_at(value, &["columnDefinitions"])
            .iter()
            .map(|c| str_at(c, &["name"]).to_string())
            .collect();
        let rows = array_at(value, &["rows"])
            .iter()
            .map(|row| TableRow {
                cells: array_at(row, &["cells"])
                    .iter()
                    .map(|cell| match cell {
                        Value::String(s) => s.clone(),
                        Value::Null => String::new(),
                        other => other.to_string(),
                    })
                    .collect(),
                namespace: namespace(row.get("object").unwrap_or(&Value::Null)).to_string(),
            })
            .collect();
        Self { columns, rows }
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Cell of `row` in `column`, empty when the column is unknown.
    pub fn cell<'a>(&self, row: &'a TableRow, column: &str) -> &'a str {
        self.column_index(column)
            .and_then(|i| row.cells.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }
}
