//! Editing model: caret position and selection tracking

mod cursor;

pub use cursor::{CursorSnapshot, CursorStats, CursorTracker, DocPosition, Selection};
