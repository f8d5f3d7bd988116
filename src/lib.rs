pub mod config;
pub mod error;
pub mod frame;
pub mod osc;
pub mod playback;
pub mod processor;
pub mod source;
pub mod transport;
pub mod user_state;

pub use error::{BridgeError, EncodeError, ProviderError, TransportError};
pub use frame::{Frame, JointSample, JointType, TrackingStatus, UserFrame, UserId};
pub use processor::{BridgeStats, FrameProcessor, FrameReport, TickOutcome};
