//! Notification hub for live observers.
//!
//! Producers publish from any thread; each observer owns a bounded queue and
//! a handle to drain it. A future server build can bridge `ObserverHandle`
//! onto a WebSocket or similar long-lived connection.

/// Observer registry and fan-out.
pub mod dispatcher;
/// Observer stream handle.
pub mod stream;

pub use dispatcher::{HubConfig, NotificationHub};
pub use stream::{ObserverHandle, ObserverId};
