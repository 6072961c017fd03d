mod cursor;
mod matrix;
mod nav;

pub use cursor::Cursor;
pub use matrix::{ConnectionMatrix, MAX_PORTS};
pub use nav::{InputOutcome, NavigationController, Rejection, SelectOutcome, Step, Toggle};
