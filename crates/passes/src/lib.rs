pub mod locals;
pub mod pipeline;

pub use locals::IdentifyLocals;
pub use pipeline::{Pass, Pipeline};
