pub const SCHEMA: &str = r#"
-- Accounts. password_hash is NULL for passkey, guest and federated users.
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    password_hash TEXT,
    provider TEXT NOT NULL DEFAULT 'local',
    roles TEXT NOT NULL DEFAULT 'user',  -- comma separated
    is_active INTEGER NOT NULL DEFAULT 1,
    refresh_token TEXT,                  -- latest issued refresh token
    avatar_url TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Refresh token identifiers that must never be accepted again
CREATE TABLE IF NOT EXISTS revoked_tokens (
    token_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    revoked_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS passkeys (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    credential_id BLOB NOT NULL UNIQUE,
    public_key BLOB NOT NULL,
    algorithm INTEGER NOT NULL,
    counter INTEGER NOT NULL DEFAULT 0,
    name TEXT NOT NULL,
    clone_suspected INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    last_used_at TEXT
);

CREATE TABLE IF NOT EXISTS rooms (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_by TEXT NOT NULL REFERENCES users(id),
    admin_id TEXT NOT NULL REFERENCES users(id),
    is_active INTEGER NOT NULL DEFAULT 1,
    is_public INTEGER NOT NULL DEFAULT 0,
    mode TEXT NOT NULL DEFAULT 'standard',
    max_participants INTEGER NOT NULL DEFAULT 20,

    -- Settings
    allow_chat INTEGER NOT NULL DEFAULT 1,
    allow_video INTEGER NOT NULL DEFAULT 1,
    allow_audio INTEGER NOT NULL DEFAULT 1,
    require_approval INTEGER NOT NULL DEFAULT 0,
    e2ee INTEGER NOT NULL DEFAULT 0,

    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT NOT NULL
);

-- Room membership. Rows are removed explicitly when the room goes away.
CREATE TABLE IF NOT EXISTS room_participants (
    id TEXT PRIMARY KEY,
    room_id TEXT NOT NULL REFERENCES rooms(id),
    user_id TEXT NOT NULL REFERENCES users(id),
    joined_at TEXT NOT NULL,
    left_at TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    is_approved INTEGER NOT NULL DEFAULT 0,
    is_muted INTEGER NOT NULL DEFAULT 0,
    is_video_off INTEGER NOT NULL DEFAULT 0,
    is_chat_blocked INTEGER NOT NULL DEFAULT 0,
    is_banned INTEGER NOT NULL DEFAULT 0,
    is_on_stage INTEGER NOT NULL DEFAULT 0,
    UNIQUE(room_id, user_id)
);

-- Elevated per-room capabilities. Absence means none.
CREATE TABLE IF NOT EXISTS room_permissions (
    room_id TEXT NOT NULL REFERENCES rooms(id),
    user_id TEXT NOT NULL REFERENCES users(id),
    is_admin INTEGER NOT NULL DEFAULT 0,
    can_kick INTEGER NOT NULL DEFAULT 0,
    can_mute_audio INTEGER NOT NULL DEFAULT 0,
    can_disable_video INTEGER NOT NULL DEFAULT 0,
    can_chat INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (room_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_revoked_tokens_expires ON revoked_tokens(expires_at);
CREATE INDEX IF NOT EXISTS idx_passkeys_user ON passkeys(user_id);
CREATE INDEX IF NOT EXISTS idx_rooms_created_by ON rooms(created_by);
CREATE INDEX IF NOT EXISTS idx_rooms_expires ON rooms(is_active, expires_at);
CREATE INDEX IF NOT EXISTS idx_room_participants_user ON room_participants(user_id);
CREATE INDEX IF NOT EXISTS idx_room_permissions_user ON room_permissions(user_id);
"#;
