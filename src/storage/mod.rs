mod catalog;
pub mod db;
mod events;
pub mod models;
mod tables;
mod tokens;

pub use db::{Database, DatabaseError};
pub use tables::*;
