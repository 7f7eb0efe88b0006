use serde::Serialize;
use serde::ser::SerializeMap;
use serde_json::Value;

/// Output key and the upstream key it is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub output: &'static str,
    pub source: &'static str,
}

impl FieldMapping {
    pub const fn same(key: &'static str) -> Self {
        Self {
            output: key,
            source: key,
        }
    }

    pub const fn renamed(output: &'static str, source: &'static str) -> Self {
        Self { output, source }
    }
}

/// Reviewed output shape of one tool.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionSchema {
    /// Key of the record array inside the upstream body.
    pub source_collection: &'static str,
    pub fields: &'static [FieldMapping],
}

impl ProjectionSchema {
    pub fn output_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|field| field.output)
    }
}

/// Fixed-key record; serializes as a JSON object in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedRecord {
    fields: Vec<(&'static str, Value)>,
}

impl ProjectedRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(name, _)| *name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for ProjectedRecord {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

fn lookup<'a>(record: &'a Value, key: &str) -> Option<&'a Value> {
    record.as_object().and_then(|object| object.get(key))
}

/// Copies each schema field from `record`; absent keys become null, extra keys are dropped.
pub fn project(record: &Value, schema: &ProjectionSchema) -> ProjectedRecord {
    let fields = schema
        .fields
        .iter()
        .map(|field| {
            let value = lookup(record, field.source).cloned().unwrap_or(Value::Null);
            (field.output, value)
        })
        .collect();
    ProjectedRecord { fields }
}

/// Projects every record of the schema's source collection. A missing or
/// non-array collection yields no records.
pub fn project_collection(body: &Value, schema: &ProjectionSchema) -> Vec<ProjectedRecord> {
    lookup(body, schema.source_collection)
        .and_then(Value::as_array)
        .map(|records| records.iter().map(|record| project(record, schema)).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::catalog::{smart_money_tool, top_score_tool};

    #[test]
    fn sparse_record_projects_with_nulls() {
        let schema = top_score_tool().projection;
        let record = json!({"token_address": "ABC", "symbol": "X", "usd_price": 1.2});

        let projected = project(&record, &schema);
        assert_eq!(projected.get("CA address"), Some(&json!("ABC")));
        assert_eq!(projected.get("symbol"), Some(&json!("X")));
        assert_eq!(projected.get("usd_price"), Some(&json!(1.2)));
        for key in ["volume_h24", "fdv", "market_cap", "price_change_h24", "liquidity_usd", "score", "token_age"] {
            assert_eq!(projected.get(key), Some(&Value::Null), "{key} should be null");
        }
    }

    #[test]
    fn keys_outside_schema_are_never_emitted() {
        let schema = smart_money_tool().projection;
        let record = json!({
            "address": "So1",
            "symbol": "BONK",
            "image_url": "https://cdn.example/bonk.png",
            "roi": 3.2,
            "pumpfun_link": "https://pump.fun/So1"
        });

        let projected = project(&record, &schema);
        let keys: Vec<&str> = projected.keys().collect();
        let expected: Vec<&str> = schema.output_keys().collect();
        assert_eq!(keys, expected);
        assert!(projected.get("image_url").is_none());
        assert!(projected.get("address").is_none());
        assert_eq!(projected.get("CA address"), Some(&json!("So1")));
    }

    #[test]
    fn non_object_record_projects_to_all_null() {
        let schema = top_score_tool().projection;
        let projected = project(&json!("not a record"), &schema);
        assert_eq!(projected.len(), schema.fields.len());
        assert!(projected.keys().all(|key| projected.get(key) == Some(&Value::Null)));
    }

    #[test]
    fn nested_values_are_copied_verbatim() {
        let schema = smart_money_tool().projection;
        let record = json!({"websites": [{"label": "site", "url": "https://x.example"}]});
        let projected = project(&record, &schema);
        assert_eq!(
            projected.get("websites"),
            Some(&json!([{"label": "site", "url": "https://x.example"}]))
        );
    }

    #[test]
    fn serialization_follows_schema_order() {
        let schema = top_score_tool().projection;
        let projected = project(&json!({"symbol": "X"}), &schema);
        let rendered = serde_json::to_string(&projected).expect("serialize");
        assert!(rendered.starts_with(r#"{"usd_price":null,"CA address":null,"symbol":"X","#));
        assert!(rendered.ends_with(r#""token_age":null}"#));
    }

    #[test]
    fn collection_projection_handles_missing_and_malformed_collections() {
        let schema = top_score_tool().projection;
        assert!(project_collection(&json!({}), &schema).is_empty());
        assert!(project_collection(&json!({"users": {"a": 1}}), &schema).is_empty());
        assert!(project_collection(&json!({"users": []}), &schema).is_empty());

        let records = project_collection(
            &json!({"users": [{"symbol": "A"}, {"symbol": "B"}], "total": 2}),
            &schema,
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("symbol"), Some(&json!("B")));
    }
}
