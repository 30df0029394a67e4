pub mod realtime;
pub mod session;
pub mod transcoder;

pub use realtime::{RealtimeError, RealtimeResult, SpeechSessionState};
pub use session::{SessionTuning, SpeechSessionWorker, WorkerOutput};
pub use transcoder::AudioTranscoder;
