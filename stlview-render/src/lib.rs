//! Rendering for stlview
//!
//! Adaptive framing, the render-session lifecycle, an offscreen still
//! renderer for PNG previews, and an interactive winit viewer.

pub mod context;
pub mod framing;
pub mod pipeline;
pub mod session;
pub mod still;
pub mod viewer;

pub use context::GpuContext;
pub use framing::{FramingProfile, FramingResult};
pub use session::{RenderSession, SessionSlot, SessionState};
pub use still::{to_data_uri, StillRenderer};
pub use viewer::Viewer;
