//! Domain model structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row, plus the DTOs used to write it.

pub mod download_request;
pub mod seeding_record;
pub mod status;
