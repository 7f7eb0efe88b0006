use std::collections::HashSet;

use serde_json::{Map, Value, json};
use thiserror::Error;
use url::Url;

use crate::normalize::{LIMIT_PARAM, NormalizedRequest, PAGE_SIZE, START_PARAM};
use crate::projection::{FieldMapping, ProjectionSchema};

pub const TOP_SCORE_TOOL: &str = "get-sol-top-score-list";
pub const SMART_MONEY_TOOL: &str = "get-sol-smart-money-listing";

const TOP_SCORE_ENDPOINT: &str = "/onchain/v1/findgems/top_score";
const SMART_MONEY_ENDPOINT: &str = "/onchain/v1/findgems/smart_money_new_listing_buy";

const TOP_SCORE_FIELDS: &[FieldMapping] = &[
    FieldMapping::same("usd_price"),
    FieldMapping::renamed("CA address", "token_address"),
    FieldMapping::same("symbol"),
    FieldMapping::same("volume_h24"),
    FieldMapping::same("fdv"),
    FieldMapping::same("market_cap"),
    FieldMapping::same("price_change_h24"),
    FieldMapping::same("liquidity_usd"),
    FieldMapping::same("score"),
    FieldMapping::same("token_age"),
];

const SMART_MONEY_FIELDS: &[FieldMapping] = &[
    FieldMapping::renamed("CA address", "address"),
    FieldMapping::same("symbol"),
    FieldMapping::same("current_price"),
    FieldMapping::same("pnl"),
    FieldMapping::same("token_age"),
    FieldMapping::same("avg_price"),
    FieldMapping::same("price_change_24h"),
    FieldMapping::same("NumberOfSmartMoney"),
    FieldMapping::same("usdt_value"),
    FieldMapping::same("total_spent"),
    FieldMapping::same("liquidity"),
    FieldMapping::same("market_cap"),
    FieldMapping::same("fdv"),
    FieldMapping::same("score"),
    FieldMapping::same("risk"),
    FieldMapping::same("websites"),
    FieldMapping::same("telegram_handle"),
    FieldMapping::same("twitter_handle"),
    FieldMapping::same("discord_url"),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool '{0}' is registered more than once")]
    DuplicateTool(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Integer,
    String,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::Integer => "integer",
            ParamType::String => "string",
        }
    }
}

/// One caller-settable argument of a tool.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub param_type: ParamType,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
    pub default: Value,
}

impl ParamSpec {
    pub fn integer(name: &'static str, description: &'static str, default: i64) -> Self {
        Self {
            name,
            description,
            param_type: ParamType::Integer,
            minimum: None,
            maximum: None,
            default: Value::from(default),
        }
    }

    pub fn with_minimum(mut self, minimum: i64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    pub fn with_maximum(mut self, maximum: i64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    fn schema(&self) -> Value {
        let mut schema = json!({
            "type": self.param_type.as_str(),
            "description": self.description,
        });
        if let Some(minimum) = self.minimum {
            schema["minimum"] = Value::from(minimum);
        }
        if let Some(maximum) = self.maximum {
            schema["maximum"] = Value::from(maximum);
        }
        schema["default"] = self.default.clone();
        schema
    }
}

/// Everything needed to serve one tool: its advertised schema, the
/// server-fixed upstream parameters, the endpoint and the output projection.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
    /// Appended to every upstream query; never advertised, never caller-settable.
    pub fixed_query: Vec<(&'static str, Value)>,
    pub endpoint: &'static str,
    pub projection: ProjectionSchema,
    pub failure_message: &'static str,
}

impl ToolDescriptor {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|param| param.name == name)
    }

    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|param| (param.name.to_string(), param.schema()))
            .collect();
        json!({
            "type": "object",
            "properties": properties,
        })
    }

    pub fn upstream_url(&self, base: &Url, request: &NormalizedRequest) -> Url {
        let mut url = base.clone();
        let path = format!("{}{}", base.path().trim_end_matches('/'), self.endpoint);
        url.set_path(&path);
        url.set_query(None);
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in request.query_pairs() {
                query.append_pair(name, &value);
            }
        }
        url
    }
}

fn paging_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::integer(LIMIT_PARAM, "Number of results to return", PAGE_SIZE)
            .with_minimum(1)
            .with_maximum(PAGE_SIZE),
        ParamSpec::integer(START_PARAM, "Starting position for pagination", 1).with_minimum(1),
    ]
}

pub fn top_score_tool() -> ToolDescriptor {
    ToolDescriptor {
        name: TOP_SCORE_TOOL,
        description: "get solana tokens top scoring cryptocurrency list, must contain CA address price and symbol and volume_h24 and market_cap and liquidity_usd and score and token_age",
        params: paging_params(),
        fixed_query: vec![
            ("chain", Value::from("solana")),
            ("frame", Value::from("30d")),
        ],
        endpoint: TOP_SCORE_ENDPOINT,
        projection: ProjectionSchema {
            source_collection: "users",
            fields: TOP_SCORE_FIELDS,
        },
        failure_message: "Failed to retrieve gems data",
    }
}

pub fn smart_money_tool() -> ToolDescriptor {
    ToolDescriptor {
        name: SMART_MONEY_TOOL,
        description: "get new solana tokens listings with smart money tracking, must contain CA address price and symbol and volume_h24 and market_cap and liquidity_usd and score and token_age",
        params: paging_params(),
        fixed_query: vec![
            ("chain", Value::from("solana")),
            ("frame", Value::from("1d")),
        ],
        endpoint: SMART_MONEY_ENDPOINT,
        projection: ProjectionSchema {
            source_collection: "smart_money_new_listing_buy",
            fields: SMART_MONEY_FIELDS,
        },
        failure_message: "Failed to retrieve smart money data",
    }
}

/// Immutable catalog built once at startup and shared read-only by every session.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<ToolDescriptor>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for tool in &tools {
            if !seen.insert(tool.name) {
                return Err(RegistryError::DuplicateTool(tool.name.to_string()));
            }
        }
        Ok(Self { tools })
    }

    pub fn builtin() -> Self {
        Self {
            tools: vec![top_score_tool(), smart_money_tool()],
        }
    }

    pub fn list(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|tool| tool.name == name)
    }
}
