pub mod engine;
pub mod style;

pub use engine::{EdgeLayout, LayoutEngine, LayoutOptions, LayoutResult, NodeLayout, Point};
pub use style::{legend, type_color, LegendEntry, StyleOptions};
