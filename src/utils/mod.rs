pub mod progress;

pub use progress::{ChannelProgress, NoopProgress, ProgressSink, RunEvent};
