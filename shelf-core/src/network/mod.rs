//! Framed, timeout-bounded message channels over byte streams.

pub mod channel;
pub mod history;

pub use channel::{
    ChannelSettings, DEFAULT_MESSAGE_TIMEOUT, FramedChannel, MessageReader, MessageWriter,
};
pub use history::{DEFAULT_HISTORY_CAPACITY, Direction, HistoryEntry, MessageHistory};
