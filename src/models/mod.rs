pub mod control;
pub mod diagnostics;
pub mod doc;
pub mod error;
pub mod health;
pub mod messages;
pub mod placement;
pub mod ticket;

pub use control::*;
pub use diagnostics::*;
pub use doc::*;
pub use error::*;
pub use health::*;
pub use messages::*;
pub use placement::*;
pub use ticket::*;
