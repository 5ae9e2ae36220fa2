mod media;
mod registry;

pub use media::{LiveKitClient, MediaGrant, MediaPermission, MediaService, TrackSource};
pub use registry::{
    AdminGrant, CreateRoom, DEFAULT_MAX_PARTICIPANTS, JoinedRoom, MAX_PARTICIPANTS_LIMIT,
    PermissionUpdate, RoomRegistry, UserRooms, media_permission,
};
