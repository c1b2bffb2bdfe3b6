use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;

/// Shared scratch variables visible to scripts.
///
/// One instance is engine-wide, and each deployed channel owns one more for
/// its global channel map. Neither is an ambient global; both are reached
/// through the component that owns them.
#[derive(Debug, Default)]
pub struct GlobalMap {
    values: DashMap<String, Value>,
}

impl GlobalMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|v| v.value().clone())
    }

    pub fn put(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.remove(key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn clear(&self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.values
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_clear() {
        let map = GlobalMap::new();
        assert!(map.put("count", Value::from(1)).is_none());
        assert_eq!(map.put("count", Value::from(2)), Some(Value::from(1)));
        assert_eq!(map.get("count"), Some(Value::from(2)));
        assert_eq!(map.snapshot().len(), 1);
        map.clear();
        assert!(map.is_empty());
    }
}
