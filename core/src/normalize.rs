use serde::Serialize;
use serde::ser::SerializeMap;
use serde_json::{Map, Number, Value};

use crate::catalog::ToolDescriptor;

pub const LIMIT_PARAM: &str = "limit";
pub const START_PARAM: &str = "start";

/// Hard page size ceiling. Every upstream call asks for exactly this many rows.
pub const PAGE_SIZE: i64 = 10;

/// Complete, bounded upstream parameters for a single tool call.
///
/// Every advertised parameter of the descriptor is present, followed by the
/// descriptor's fixed query parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRequest {
    params: Vec<(&'static str, Value)>,
}

impl NormalizedRequest {
    pub fn builder(descriptor: &ToolDescriptor) -> NormalizedRequestBuilder<'_> {
        NormalizedRequestBuilder {
            descriptor,
            params: descriptor
                .params
                .iter()
                .map(|param| (param.name, param.default.clone()))
                .collect(),
        }
    }

    /// Defaults, then caller overrides, then the start floor, then the page size ceiling.
    pub fn from_invocation(
        descriptor: &ToolDescriptor,
        arguments: Option<&Map<String, Value>>,
    ) -> Self {
        Self::builder(descriptor)
            .merge_overrides(arguments)
            .apply_start_floor()
            .apply_page_size_ceiling()
            .build()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.params.iter().map(|(key, _)| *key)
    }

    pub fn query_pairs(&self) -> impl Iterator<Item = (&'static str, String)> + '_ {
        self.params
            .iter()
            .map(|(key, value)| (*key, query_value(value)))
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.params
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        )
    }
}

impl Serialize for NormalizedRequest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.params.len()))?;
        for (key, value) in &self.params {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

pub struct NormalizedRequestBuilder<'a> {
    descriptor: &'a ToolDescriptor,
    params: Vec<(&'static str, Value)>,
}

impl NormalizedRequestBuilder<'_> {
    /// Copies caller values for declared parameters only. Unknown keys are dropped.
    pub fn merge_overrides(mut self, arguments: Option<&Map<String, Value>>) -> Self {
        let Some(arguments) = arguments else {
            return self;
        };
        for (key, value) in self.params.iter_mut() {
            if let Some(supplied) = arguments.get(*key) {
                *value = supplied.clone();
            }
        }
        self
    }

    /// `start` below 1 becomes 1; any other number is kept. Values that are not
    /// numbers fall back to the declared default first.
    pub fn apply_start_floor(mut self) -> Self {
        let default = self
            .descriptor
            .param(START_PARAM)
            .and_then(|param| coerce_number(&param.default))
            .unwrap_or_else(|| Value::from(1));
        if let Some((_, value)) = self.params.iter_mut().find(|(key, _)| *key == START_PARAM) {
            let start = coerce_number(value).unwrap_or_else(|| default.clone());
            *value = if start.as_f64().is_some_and(|raw| raw >= 1.0) {
                start
            } else {
                Value::from(1)
            };
        }
        self
    }

    /// `limit` is always the fixed page size, whatever the caller or the defaults said.
    pub fn apply_page_size_ceiling(mut self) -> Self {
        if let Some((_, value)) = self.params.iter_mut().find(|(key, _)| *key == LIMIT_PARAM) {
            *value = Value::from(PAGE_SIZE);
        }
        self
    }

    pub fn build(self) -> NormalizedRequest {
        let mut params = self.params;
        params.extend(
            self.descriptor
                .fixed_query
                .iter()
                .map(|(key, value)| (*key, value.clone())),
        );
        NormalizedRequest { params }
    }
}

/// Integral values come back as JSON integers, fractional ones unchanged.
fn coerce_number(value: &Value) -> Option<Value> {
    let number = match value {
        Value::Number(number) => number.clone(),
        Value::String(raw) => {
            let raw = raw.trim();
            match raw.parse::<i64>() {
                Ok(parsed) => Number::from(parsed),
                Err(_) => raw.parse::<f64>().ok().and_then(Number::from_f64)?,
            }
        }
        _ => return None,
    };
    if let Some(integer) = number.as_i64() {
        return Some(Value::from(integer));
    }
    let raw = number.as_f64().filter(|raw| raw.is_finite())?;
    if raw.fract() == 0.0 {
        Some(Value::from(raw.clamp(i64::MIN as f64, i64::MAX as f64) as i64))
    } else {
        Some(Value::Number(number))
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(raw) => raw.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
