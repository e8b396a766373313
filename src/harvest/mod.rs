//! Proxy harvesting
//!
//! Source adapters turn public proxy lists into `ProxyRecord`s; the
//! coordinator runs a selection of them concurrently and merges the results.

mod coordinator;
mod geonode;
mod html_table;
mod plain_list;
mod registry;
mod source;

pub use coordinator::{HarvestCoordinator, HarvestOptions, AGGREGATE_SOURCE};
pub use geonode::{parse_json_page, JsonApiSource, GEONODE_URL};
pub use html_table::{parse_html_table, HtmlTableSource};
pub use plain_list::{parse_plain_list, PlainListSource};
pub use registry::SourceRegistry;
pub use source::{SourceAdapter, SourceClient};
