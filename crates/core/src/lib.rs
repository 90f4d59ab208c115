//! Domain logic shared by every bookhound crate.
//!
//! Nothing in here performs I/O beyond the filesystem scan in
//! [`acquisition::locate_ebook_file`]; the tracker, daemon, and database
//! crates build on these types.

pub mod acquisition;
pub mod error;
pub mod matching;
pub mod search;
pub mod types;
