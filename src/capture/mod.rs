//! Screen capture capability.
//!
//! The core consumes the display through the `ScreenSource` trait so the
//! detection and workflow logic stays platform-neutral and testable. The
//! Windows Graphics Capture implementation lives in the platform
//! submodules.

use image::{ImageBuffer, Rgba};

use crate::error::Result;

#[cfg(windows)]
pub mod screenshot;
#[cfg(windows)]
pub mod window;

#[cfg(windows)]
pub use screenshot::WindowCapture;

/// A captured raster frame (RGBA, row-major).
pub type Frame = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// On-demand capture of the current display or active-window region.
pub trait ScreenSource: Send + Sync {
    /// Captures one frame. Each call returns a fresh buffer; callers are
    /// expected to drop it promptly to keep memory bounded to roughly one
    /// frame at a time.
    fn capture(&self) -> Result<Frame>;
}
