//! # lib-x6-ffi
//!
//! Safe bindings for the libx6 digitizer driver.
//!
//! The driver ships as a shared library (`libx6.so`, `libx6.dylib` or
//! `libx6.dll`). This crate handles:
//!
//! - Dynamic library loading with `libloading`
//! - A typed table of the exported entry points, with optional symbols
//!   for features older builds lack
//! - Status code translation using the driver's own messages
//! - A device session that owns the connection to one card
//! - Timeout protection and panic capture for blocking calls
//!
//! # Example
//!
//! ```ignore
//! use lib_x6_ffi::{X6Library, X6Session};
//! use lib_types::{ChannelTuple, DigitizerMode};
//!
//! let lib = X6Library::load("/opt/x6/libx6.so")?;
//! let mut session = X6Session::new(lib);
//! session.connect(0)?;
//! session.set_digitizer_mode(DigitizerMode::Averager)?;
//! session.enable_stream(ChannelTuple::new(1, 1, 0))?;
//! session.acquire()?;
//! session.wait_for_acquisition(std::time::Duration::from_secs(1))?;
//! let data = session.transfer_stream(ChannelTuple::new(1, 1, 0))?;
//! ```

pub mod api;
pub mod error;
pub mod loader;
pub mod session;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use api::{error_message, num_devices, set_log, set_logging_level, X6Api};
pub use error::{X6Error, X6Result};
pub use loader::{LibraryFormat, X6Library};
pub use session::{orphaned_thread_count, ExecutionConfig, X6Session};
