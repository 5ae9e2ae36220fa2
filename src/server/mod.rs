mod admin;
pub mod auth;
pub mod dto;
pub mod response;
mod room;
mod router;

pub use admin::admin_router;
pub use auth::auth_router;
pub use room::room_router;
pub use router::{AppState, create_router};
