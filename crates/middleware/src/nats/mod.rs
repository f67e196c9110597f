mod peek;
pub mod streams;

pub use peek::NatsConnector;
pub use streams::{sanitize_stream_token, stream_name_for_path, DEAD_LETTER_STREAM_SUFFIX};
