mod models;
mod role;
mod room_name;

pub use models::*;
pub use role::{Role, format_role_list, normalize_roles, parse_role_list, roles_satisfy};
pub use room_name::{
    MAX_ROOM_NAME_LEN, MIN_ROOM_NAME_LEN, RoomNameError, generate_room_name, normalize_room_name,
    validate_room_name,
};
