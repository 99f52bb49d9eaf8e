mod action;
mod action_kind;
mod device;
mod device_snap;
mod device_version;
mod group;
mod publisher;
mod result;

pub use action::*;
pub use action_kind::*;
pub use device::*;
pub use device_snap::*;
pub use device_version::*;
pub use group::*;
pub use publisher::*;
pub use result::*;
