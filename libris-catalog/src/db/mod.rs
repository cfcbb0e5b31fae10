//! Catalog data access for libris-catalog
//!
//! Read helpers are generic over the sqlx executor so the same query runs on
//! the pool (duplicate detection) and inside a batch transaction (the batch
//! writer's re-check).

pub mod authors;
pub mod books;
pub mod settings;

pub use authors::{Author, AuthorId};
pub use books::{Book, BookId, NewBook};
