//! Test Helper Utilities
//!
//! Shared utilities for testing libris-catalog

#![allow(dead_code)]

pub mod db_utils;

pub use db_utils::{
    book_authors, count_rows, create_test_db, install_author_block, install_poison_trigger, seed_author, seed_book,
    test_pipeline, test_request,
};
