pub mod analysis;
pub mod assignment;
pub mod config;
pub mod coords;
pub mod flood_fill;
pub mod ids;
pub mod label;
pub mod persist;
pub mod protocol;
pub mod scheduler;
pub mod shape;
pub mod sparse;
pub mod split;
pub mod stroke;
pub mod task;
pub mod transport;
pub mod volume;

pub use config::PaintConfig;
pub use coords::{ChunkCoord, ChunkShape, Interval, Position};
pub use label::{Label, LabelId};
pub use scheduler::{DispatchEvent, Scheduler, TaskQueue};
pub use sparse::{Mask, SparseVolume};
pub use stroke::{PaintReconciler, StrokeError, StrokeOutcome, erase_painted};
pub use task::AnnotationTask;
