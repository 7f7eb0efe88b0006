//! Pure domain pieces of the gems MCP server: the tool catalog, argument
//! normalization and projection of upstream records. Nothing here does I/O.

pub mod catalog;
pub mod normalize;
pub mod projection;

pub use catalog::{
    ParamSpec, ParamType, RegistryError, SMART_MONEY_TOOL, TOP_SCORE_TOOL, ToolDescriptor,
    ToolRegistry,
};
pub use normalize::{NormalizedRequest, PAGE_SIZE};
pub use projection::{FieldMapping, ProjectedRecord, ProjectionSchema, project, project_collection};
