//! Reencode Plugin - the facade JS-style hosts talk to
//!
//! - `plugin`: command dispatch (`reencodeVideo`, `getPluginVersion`,
//!   `cancelReencode`) and lazy engine setup
//! - `call`: promise-style calls answered exactly once
//! - `options`: JSON option parsing and validation
//! - `listeners`: `"progress"` listener registry
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use reencode_core::config::Settings;
//! use reencode_plugin::{invoke, ReencodePlugin, REENCODE_VIDEO};
//!
//! let plugin = ReencodePlugin::from_settings(&Settings::default()).unwrap();
//! plugin
//!     .add_listener("progress", Arc::new(|data: &serde_json::Value| println!("{}", data)))
//!     .unwrap();
//!
//! let handle = invoke(
//!     &plugin,
//!     REENCODE_VIDEO,
//!     serde_json::json!({"inputPath": "/tmp/a.mov", "outputPath": "/tmp/b.mp4", "width": 960, "height": 540}),
//! );
//! println!("{:?}", handle.wait());
//! ```

pub mod call;
pub mod errors;
pub mod listeners;
pub mod options;
pub mod plugin;

pub use call::{CallHandle, CallResult, PluginCall};
pub use errors::{PluginError, PluginResult};
pub use listeners::{Listener, ListenerHandle, ListenerRegistry};
pub use options::parse_reencode_options;
pub use plugin::{
    invoke, ReencodePlugin, CANCEL_REENCODE, GET_PLUGIN_VERSION, JS_NAME, PLUGIN_VERSION,
    REENCODE_VIDEO,
};
