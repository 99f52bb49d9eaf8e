mod action_repository;
mod client;
mod config;
mod device_repository;
mod device_snap_repository;
mod device_version_repository;
mod group_repository;

pub use action_repository::*;
pub use client::*;
pub use config::*;
pub use device_repository::*;
pub use device_snap_repository::*;
pub use device_version_repository::*;
pub use group_repository::*;
