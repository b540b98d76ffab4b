pub mod event;
pub mod save_to_file;

pub use event::{EventFilter, EventIter};
pub use save_to_file::{SavablePoint, SaveToFileFilter};
