//! Row selection: equality filters, one ordering, and a limit.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub filters: Vec<(String, String)>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// PostgREST query-string pairs, e.g. `id=eq.7&order=created_at.desc`.
    pub fn to_postgrest_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        for (column, value) in &self.filters {
            params.push((column.clone(), format!("eq.{value}")));
        }
        if let Some(order) = &self.order {
            let dir = if order.ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{dir}", order.column)));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// Whether `row` passes every equality filter.
    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|(column, expected)| match row.get(column) {
            Some(Value::String(s)) => s == expected,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == *expected,
        })
    }
}
