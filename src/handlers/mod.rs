pub mod diagnostics;
pub mod health;
pub mod room_ticket;

pub use diagnostics::*;
pub use health::*;
pub use room_ticket::*;
