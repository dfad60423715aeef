//! Dynamic Matter Bridge library.
//!
//! Maps non-Matter devices onto dynamically allocated Matter endpoints:
//! attribute storage, the endpoint registry, and change reporting onto the
//! stack thread.

pub mod bridge;
pub mod config;
pub mod device;
pub mod error;
pub mod input;
pub mod matter;
