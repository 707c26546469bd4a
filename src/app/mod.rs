pub mod adb;
pub mod commands;
pub mod config;
pub mod endpoint;
pub mod enumerator;
pub mod error;
pub mod file_lock;
pub mod logging;
pub mod models;
pub mod scheduler;
pub mod state;
pub mod state_store;
pub mod tasks;

#[cfg(test)]
pub(crate) mod test_utils;
