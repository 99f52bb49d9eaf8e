mod device_service;
mod dispatcher;
mod group_service;
mod messages;
mod reconciler;
mod router;
mod snap_service;

pub use device_service::*;
pub use dispatcher::*;
pub use group_service::*;
pub use messages::*;
pub use reconciler::*;
pub use router::*;
pub use snap_service::*;
