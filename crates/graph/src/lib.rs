pub mod analytics;
pub mod assembler;
pub mod model;

pub use analytics::GraphAnalytics;
pub use assembler::GraphAssembler;
pub use model::{Entity, GraphModel, Relationship, TypeConflict};
