pub mod output;
pub mod surface;

pub use surface::{NullSurface, PresentationSurface, RawFileSurface, SurfaceError};
