pub mod grid;
pub mod input;
pub mod pipeline;
pub mod topology;
pub mod view;

pub use grid::{ConnectionMatrix, Cursor, NavigationController};
pub use pipeline::Pipeline;
pub use topology::{PortTopologySource, TopologySnapshot};
pub use view::DisplaySink;
