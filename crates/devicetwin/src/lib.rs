pub mod domain;
mod devicetwin;
pub mod mqtt;

pub use devicetwin::*;
pub use domain::*;
