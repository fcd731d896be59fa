//! Timed bulb exposures on a USB tethered DSLR, with a relay switched light,
//! and stitching of the captured frames into a timestamped video.

pub mod camera_api;
pub mod clock;
pub mod config;
pub mod error;
pub mod exposure;
pub mod parameters;
pub mod relay;
pub mod rig;
pub mod supervisor;
pub mod timelapse;

pub use error::{CaptureError, Result};
