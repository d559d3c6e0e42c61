mod fixed_window;
mod token_bucket;

pub use fixed_window::MemoryFixedWindow;
pub use token_bucket::MemoryTokenBucket;
