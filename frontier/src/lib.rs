mod filter;
mod frontier_trait;
mod memory;
mod state;

pub use filter::UrlFilter;
pub use frontier_trait::Frontier;
pub use memory::MemoryFrontier;
