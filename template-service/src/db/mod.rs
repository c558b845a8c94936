//! Database layer - pool, request sessions and generic CRUD
//!
//! # Design Principles
//!
//! - One pool per process, one [`Session`] per request
//! - A session owns at most one connection, acquired on first use
//! - Rely on DB constraints and classify violations - no check-then-insert
//! - Transaction demarcation lives in the use-case wrapper, not here

pub mod crud;
pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod session;

pub use crud::{Crud, Entity, FieldValue, Fields};
pub use error::DbError;
pub use models::{Role, User};
pub use pool::create_pool;
pub use session::{Session, TransactionScope, TxState};
