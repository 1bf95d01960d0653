//! Database entities shared by the server.
//!
//! The schema itself is owned by the database; these mirror it by hand.

pub mod prelude;

pub mod account;
pub mod sea_orm_active_enums;
pub mod user;
