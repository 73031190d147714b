//! Built-in tools: calculator and web search.

mod calculator;
mod web_search;

pub use calculator::CalculatorTool;
pub use web_search::{SearchHit, WebSearchConfig, WebSearchTool};
