//! Interactive viewer session
//!
//! Owns the load state machine and everything the render loop reads each
//! frame: the prepared scene, its epoch, the orbit camera and the control
//! toggles. Drawing lives in [`crate::gfx`]; this module never touches the GPU.

pub mod cache;
pub mod readout;
pub mod session;
pub mod state;
pub mod task;

pub use cache::{AssetCache, AssetKey};
pub use readout::{CoordinateReadout, READOUT_INTERVAL};
pub use session::{StatusListener, ViewerSession};
pub use state::SessionStatus;
pub use task::{LoadTask, TaskPoll};
