//! ocpp-conform-v16 - OCPP 1.6 conformance suites
//!
//! Provides the BootNotification and Heartbeat suites, the OCPP-J frame
//! codec and a [`WsSession`] that plays the charge point role against a
//! central system.
//!
//! ```rust,no_run
//! use ocpp_conform_core::{orchestrator, TracingReporter};
//! use ocpp_conform_v16::{registry, ConnectOptions, WsSession};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let options = ConnectOptions::new("ws://localhost:9000/ocpp".parse()?, "CP001");
//! let session = WsSession::connect(&options).await?;
//! let registry = registry()?;
//! let suite = registry.get("heartbeat").expect("registered");
//! let result = orchestrator::run(&session, &suite.batch()?, suite.timeout(), &TracingReporter).await;
//! println!("{}", result.summary());
//! # Ok(())
//! # }
//! ```

pub mod boot_notification;
pub mod frame;
pub mod heartbeat;
pub mod session;
pub mod testing;

use ocpp_conform_core::{Registry, RegistryError, Schema};

pub use frame::{Frame, FrameError};
pub use session::{ConnectOptions, WsSession, SUBPROTOCOL};

/// Every OCPP 1.6 suite, in execution order
pub fn registry() -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();
    registry.register(boot_notification::suite())?;
    registry.register(heartbeat::suite())?;
    Ok(registry)
}

/// Request schema for a supported action
pub fn request_schema(action: &str) -> Option<Schema> {
    match action {
        boot_notification::ACTION => Some(boot_notification::request_schema()),
        heartbeat::ACTION => Some(heartbeat::request_schema()),
        _ => None,
    }
}
