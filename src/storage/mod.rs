pub mod db;
mod files;
mod folders;
pub mod models;
mod tables;

pub use db::{Database, DatabaseError, UniqueIndex};
pub use tables::*;
