pub mod domain;
pub mod garde;
pub mod memory;
pub mod mqtt;
pub mod postgres;
pub mod telemetry;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockActionRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDeviceRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDeviceSnapRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDeviceVersionRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockGroupRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockMessagePublisher;
