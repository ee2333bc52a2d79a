//! Tools the agent can call
//!
//! - `registry` - the `search`, `transform` and `run_code` specs
//! - `dispatcher` - argument decoding and routing, total over all inputs
//! - `search` - Google CSE with a DuckDuckGo/Wikipedia fallback chain
//! - `transform` - workflow endpoint, generation endpoint, local preview
//! - `result` - the uniform result shape folded back into the conversation

pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod result;
pub mod search;
pub mod transform;

pub use dispatcher::ToolDispatcher;
pub use error::ProviderError;
pub use registry::{ToolKind, ToolRegistry, ToolSpec};
pub use result::{SearchHit, SearchResults, ToolResult, TransformOutput};
pub use search::{SearchChain, SearchProvider};
pub use transform::{TransformPipeline, TransformTier};
