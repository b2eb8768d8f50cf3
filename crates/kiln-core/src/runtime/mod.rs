//! Kiln runtime initialization and lifecycle management.
//!
//! Wires the model provider, content cache, processor chain and request manager together and
//! runs the invalidation scheduler for them. Used both by the HTTP server and by embedders
//! such as build tools that render groups directly.
//!
//! # Examples
//!
//! ## Server Usage
//!
//! ```no_run
//! use kiln_core::{config::AppConfig, runtime::KilnRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let runtime = KilnRuntime::builder().with_config(config).build()?;
//!
//!     let manager = runtime.request_manager();
//!     // ... set up HTTP routes ...
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Embedded Usage
//!
//! ```no_run
//! use kiln_core::{config::AppConfig, manager::GroupRequest, runtime::KilnRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = KilnRuntime::builder()
//!         .with_config(AppConfig::load()?)
//!         .disable_scheduler()
//!         .preload_model()
//!         .await?;
//!
//!     let css = runtime.process(&GroupRequest::new("site", None, true)).await?;
//!     println!("{}", String::from_utf8_lossy(&css.content));
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod components;
pub mod lifecycle;

pub use builder::{KilnRuntimeBuilder, RuntimeError};
pub use components::KilnComponents;
pub use lifecycle::KilnRuntime;
