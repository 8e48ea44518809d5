pub mod channel;
pub mod transport;

pub use channel::{Envelope, MessageChannel};
pub use transport::{duplex_pair, line_channel, pump_lines};
