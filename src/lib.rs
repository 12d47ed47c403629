//! Tides updater library
//!
//! Keeps one cached NOAA tide and water temperature reading fresh. The
//! [`refresh::RefreshController`] decides when to fetch and what to write;
//! the store, the upstream client, the clock and the trigger are all handed
//! to it, so each can be swapped out in tests.

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod data;
pub mod refresh;
