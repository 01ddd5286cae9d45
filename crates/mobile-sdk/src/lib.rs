//! PushApp mobile SDK core: device and event client, event buffering,
//! in-app display queue, placeholder/tooltip registry, realtime channel,
//! push classification and the plugin bridge. Rendering is delegated to
//! the host through the `Renderer` trait.

pub mod api;
pub mod backend;
pub mod bridge;
pub mod device;
pub mod display;
pub mod events;
pub mod geometry;
pub mod inbox;
pub mod lenient;
pub mod plugin;
pub mod push;
pub mod realtime;
pub mod registry;
pub mod renderer;
pub mod sdk;
pub mod session;
pub mod storage;

pub use backend::{Backend, HttpBackend, RecordingBackend};
pub use device::{DeviceInfo, DevicePlatform};
pub use plugin::{PluginError, PushAppPlugin};
pub use renderer::{OverlayRequest, RecordingRenderer, Renderer};
pub use sdk::PushApp;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
