pub mod room_token;

pub use room_token::{get_auth_token, RoomAuth, RoomClaims};
