pub mod clock;
pub mod config;
pub mod error;
pub mod item_store;
pub mod storage;
