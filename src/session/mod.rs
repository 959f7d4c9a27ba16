//! RTSP session state
//!
//! One session per TCP connection. The session is either a publisher or a
//! reader, decided by its first ANNOUNCE or DESCRIBE.

pub mod state;
pub mod stream;

pub use state::{SessionMode, SessionPhase, SessionState};
pub use stream::TrackSetup;
