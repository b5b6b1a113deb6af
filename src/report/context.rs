//! Data context handed to report renderers.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const TEST_FILE_KEY: &str = "testFile";
pub const BEGIN_DATE_KEY: &str = "beginDate";
pub const END_DATE_KEY: &str = "endDate";
pub const TIMEZONE_KEY: &str = "timezone";

/// String-keyed nested data produced by one report run.
///
/// Holds the global keys above plus one entry per exported consumer, keyed
/// by consumer name. Keys iterate in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DataContext {
    entries: BTreeMap<String, Value>,
}

impl DataContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` under `key`, returning the previous value if any.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<String, Value>>(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_get_and_serialize() {
        let mut context = DataContext::new();
        assert!(context.put(TEST_FILE_KEY, "results.csv").is_none());
        context.put(BEGIN_DATE_KEY, Value::Null);
        context.put("requestsSummary", json!({"overall": {"total": 0}}));

        assert_eq!(context.get(TEST_FILE_KEY), Some(&json!("results.csv")));
        assert_eq!(context.len(), 3);
        assert_eq!(
            context.keys().collect::<Vec<_>>(),
            vec![BEGIN_DATE_KEY, "requestsSummary", TEST_FILE_KEY]
        );
        assert_eq!(serde_json::to_value(&context).unwrap(), context.to_json());
        assert_eq!(context.to_json()["requestsSummary"]["overall"]["total"], json!(0));
    }
}
