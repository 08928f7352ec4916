//! Client-side pipeline: prediction, reconciliation and interpolation

pub mod buffer;
pub mod clock;
pub mod interpolation;
pub mod prediction;
pub mod session;

pub use buffer::SnapshotRingBuffer;
pub use clock::ClockSync;
pub use interpolation::RenderedPlayer;
pub use prediction::PredictedState;
pub use session::{ClientError, ClientSession, FrameInput};
