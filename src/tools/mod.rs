pub mod client;
pub mod create_proposal;
pub mod executor;
pub mod params;
pub mod query_data;
pub mod registry;
pub mod sheikah_api;

pub use create_proposal::ProposalTool;
pub use executor::ToolExecutor;
pub use params::{parse_params, replace_params, substitute};
pub use query_data::QueryDataTool;
pub use registry::{Tool, ToolRegistry};
pub use sheikah_api::{ApiEndpoint, SheikahApiTool};
