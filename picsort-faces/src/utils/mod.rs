//! Utility modules for picsort-faces

pub mod cancellation;
pub mod db_retry;

pub use cancellation::until_cancelled;
pub use db_retry::retry_on_lock;
