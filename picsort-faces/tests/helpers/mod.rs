//! Test Helper Utilities
//!
//! Shared utilities for testing picsort-faces

#![allow(dead_code)]

pub mod db_utils;
pub mod fakes;

pub use db_utils::{
    all_detections, count_rows, create_file_pool, create_test_event, create_test_pool, test_context,
    test_context_with_settings, test_settings, TEST_BUCKET,
};
pub use fakes::{FakeObjectStore, FakeOracle};
