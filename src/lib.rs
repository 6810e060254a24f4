pub mod config;
pub mod error;
pub mod home;
pub mod patcher;
pub mod placeholder;
pub mod setup;
pub mod supervisor;
