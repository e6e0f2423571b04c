pub mod budget;
pub mod config;
pub mod identity;
pub mod ideas;
pub mod parts;
pub mod report;
pub mod session;
pub mod store;
pub mod time;
