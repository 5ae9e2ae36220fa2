use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::schema::SCHEMA;
use super::{JoinRequest, ParticipantFlag, Store};
use crate::error::{Error, Result};
use crate::types::*;

const USER_COLUMNS: &str = "id, email, name, password_hash, provider, roles, is_active, \
     refresh_token, avatar_url, created_at, updated_at";

const PASSKEY_COLUMNS: &str = "id, user_id, credential_id, public_key, algorithm, counter, name, \
     clone_suspected, created_at, last_used_at";

const ROOM_COLUMNS: &str = "id, name, created_by, admin_id, is_active, is_public, mode, \
     max_participants, allow_chat, allow_video, allow_audio, require_approval, e2ee, \
     created_at, updated_at, expires_at";

const PARTICIPANT_COLUMNS: &str = "p.id, p.room_id, p.user_id, p.joined_at, p.left_at, \
     p.is_active, p.is_approved, p.is_muted, p.is_video_off, p.is_chat_blocked, p.is_banned, \
     p.is_on_stage";

const PERMISSION_COLUMNS: &str =
    "room_id, user_id, is_admin, can_kick, can_mute_audio, can_disable_video, can_chat";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// An initialized store backed by a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

// Fixed-width so that stored timestamps compare correctly as text.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// True only for UNIQUE index conflicts. Foreign-key and NOT NULL failures
/// fall through as database errors.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        provider: row.get(4)?,
        roles: parse_role_list(&row.get::<_, String>(5)?),
        is_active: row.get(6)?,
        refresh_token: row.get(7)?,
        avatar_url: row.get(8)?,
        created_at: parse_datetime(&row.get::<_, String>(9)?),
        updated_at: parse_datetime(&row.get::<_, String>(10)?),
    })
}

fn row_to_passkey(row: &Row<'_>) -> rusqlite::Result<PasskeyCredential> {
    Ok(PasskeyCredential {
        id: row.get(0)?,
        user_id: row.get(1)?,
        credential_id: row.get(2)?,
        public_key: row.get(3)?,
        algorithm: row.get(4)?,
        counter: row.get(5)?,
        name: row.get(6)?,
        clone_suspected: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
        last_used_at: row
            .get::<_, Option<String>>(9)?
            .map(|s| parse_datetime(&s)),
    })
}

fn row_to_room(row: &Row<'_>) -> rusqlite::Result<Room> {
    let mode: String = row.get(6)?;
    Ok(Room {
        id: row.get(0)?,
        name: row.get(1)?,
        created_by: row.get(2)?,
        admin_id: row.get(3)?,
        is_active: row.get(4)?,
        is_public: row.get(5)?,
        mode: RoomMode::parse(&mode).unwrap_or_default(),
        max_participants: row.get(7)?,
        settings: RoomSettings {
            allow_chat: row.get(8)?,
            allow_video: row.get(9)?,
            allow_audio: row.get(10)?,
            require_approval: row.get(11)?,
            e2ee: row.get(12)?,
        },
        created_at: parse_datetime(&row.get::<_, String>(13)?),
        updated_at: parse_datetime(&row.get::<_, String>(14)?),
        expires_at: parse_datetime(&row.get::<_, String>(15)?),
    })
}

fn row_to_participant(row: &Row<'_>) -> rusqlite::Result<RoomParticipant> {
    Ok(RoomParticipant {
        id: row.get(0)?,
        room_id: row.get(1)?,
        user_id: row.get(2)?,
        joined_at: parse_datetime(&row.get::<_, String>(3)?),
        left_at: row
            .get::<_, Option<String>>(4)?
            .map(|s| parse_datetime(&s)),
        is_active: row.get(5)?,
        is_approved: row.get(6)?,
        is_muted: row.get(7)?,
        is_video_off: row.get(8)?,
        is_chat_blocked: row.get(9)?,
        is_banned: row.get(10)?,
        is_on_stage: row.get(11)?,
    })
}

fn row_to_permissions(row: &Row<'_>) -> rusqlite::Result<RoomPermissions> {
    Ok(RoomPermissions {
        room_id: row.get(0)?,
        user_id: row.get(1)?,
        is_admin: row.get(2)?,
        can_kick: row.get(3)?,
        can_mute_audio: row.get(4)?,
        can_disable_video: row.get(5)?,
        can_chat: row.get(6)?,
    })
}

fn insert_user(conn: &Connection, user: &User) -> Result<()> {
    let result = conn.execute(
        &format!(
            "INSERT INTO users ({USER_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            user.id,
            user.email,
            user.name,
            user.password_hash,
            user.provider,
            format_role_list(&user.roles),
            user.is_active,
            user.refresh_token,
            user.avatar_url,
            format_datetime(&user.created_at),
            format_datetime(&user.updated_at),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(Error::EmailTaken),
        Err(e) => Err(Error::from(e)),
    }
}

fn insert_passkey(conn: &Connection, passkey: &PasskeyCredential) -> Result<()> {
    let result = conn.execute(
        &format!(
            "INSERT INTO passkeys ({PASSKEY_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
        ),
        params![
            passkey.id,
            passkey.user_id,
            passkey.credential_id,
            passkey.public_key,
            passkey.algorithm,
            passkey.counter,
            passkey.name,
            passkey.clone_suspected,
            format_datetime(&passkey.created_at),
            passkey.last_used_at.as_ref().map(format_datetime),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => {
            Err(Error::Conflict("credential is already registered".into()))
        }
        Err(e) => Err(Error::from(e)),
    }
}

fn select_participant(
    conn: &Connection,
    room_id: &str,
    user_id: &str,
) -> Result<Option<RoomParticipant>> {
    conn.query_row(
        &format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM room_participants p
             WHERE p.room_id = ?1 AND p.user_id = ?2"
        ),
        params![room_id, user_id],
        row_to_participant,
    )
    .optional()
    .map_err(Error::from)
}

fn count_active_participants(conn: &Connection, room_id: &str) -> Result<u32> {
    conn.query_row(
        "SELECT COUNT(*) FROM room_participants WHERE room_id = ?1 AND is_active = 1",
        params![room_id],
        |row| row.get(0),
    )
    .map_err(Error::from)
}

impl SqliteStore {
    fn query_rooms(&self, sql: &str, arg: &str) -> Result<Vec<Room>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![arg], row_to_room)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn query_room(&self, sql: &str, arg: &str) -> Result<Option<Room>> {
        let conn = self.conn();
        conn.query_row(sql, params![arg], row_to_room)
            .optional()
            .map_err(Error::from)
    }
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        insert_user(&self.conn(), user)
    }

    fn create_user_with_passkey(&self, user: &User, passkey: &PasskeyCredential) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        insert_user(&tx, user)?;
        insert_passkey(&tx, passkey)?;

        tx.commit()?;
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            row_to_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            row_to_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at, id"
        ))?;
        let rows = stmt.query_map([], row_to_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_user(&self, user: &User) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE users SET name = ?1, password_hash = ?2, provider = ?3, roles = ?4,
                is_active = ?5, avatar_url = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                user.name,
                user.password_hash,
                user.provider,
                format_role_list(&user.roles),
                user.is_active,
                user.avatar_url,
                format_datetime(&user.updated_at),
                user.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound("user"));
        }
        Ok(())
    }

    fn set_refresh_token(&self, user_id: &str, refresh_token: &str) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE users SET refresh_token = ?1 WHERE id = ?2",
            params![refresh_token, user_id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound("user"));
        }
        Ok(())
    }

    fn delete_user(&self, id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        // Rooms the user created go first, each in dependency order.
        tx.execute(
            "DELETE FROM room_permissions
             WHERE room_id IN (SELECT id FROM rooms WHERE created_by = ?1 OR admin_id = ?1)",
            params![id],
        )?;
        tx.execute(
            "DELETE FROM room_participants
             WHERE room_id IN (SELECT id FROM rooms WHERE created_by = ?1 OR admin_id = ?1)",
            params![id],
        )?;
        tx.execute(
            "DELETE FROM rooms WHERE created_by = ?1 OR admin_id = ?1",
            params![id],
        )?;

        tx.execute("DELETE FROM room_permissions WHERE user_id = ?1", params![id])?;
        tx.execute("DELETE FROM room_participants WHERE user_id = ?1", params![id])?;
        tx.execute("DELETE FROM passkeys WHERE user_id = ?1", params![id])?;
        tx.execute("DELETE FROM revoked_tokens WHERE user_id = ?1", params![id])?;
        let rows = tx.execute("DELETE FROM users WHERE id = ?1", params![id])?;

        tx.commit()?;
        Ok(rows > 0)
    }

    // Revocation operations

    fn revoke_token(&self, revoked: &RevokedToken) -> Result<bool> {
        let rows = self.conn().execute(
            "INSERT INTO revoked_tokens (token_id, user_id, expires_at, revoked_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (token_id) DO NOTHING",
            params![
                revoked.token_id,
                revoked.user_id,
                format_datetime(&revoked.expires_at),
                format_datetime(&revoked.revoked_at),
            ],
        )?;
        Ok(rows > 0)
    }

    fn is_token_revoked(&self, token_id: &str) -> Result<bool> {
        let conn = self.conn();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM revoked_tokens WHERE token_id = ?1",
                params![token_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn sweep_revoked_tokens(&self, now: DateTime<Utc>) -> Result<usize> {
        let rows = self.conn().execute(
            "DELETE FROM revoked_tokens WHERE expires_at <= ?1",
            params![format_datetime(&now)],
        )?;
        Ok(rows)
    }

    // Passkey operations

    fn create_passkey(&self, passkey: &PasskeyCredential) -> Result<()> {
        insert_passkey(&self.conn(), passkey)
    }

    fn get_passkey_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> Result<Option<PasskeyCredential>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PASSKEY_COLUMNS} FROM passkeys WHERE credential_id = ?1"),
            params![credential_id],
            row_to_passkey,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_user_passkeys(&self, user_id: &str) -> Result<Vec<PasskeyCredential>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PASSKEY_COLUMNS} FROM passkeys WHERE user_id = ?1 ORDER BY created_at"
        ))?;
        let rows = stmt.query_map(params![user_id], row_to_passkey)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn advance_passkey_counter(
        &self,
        id: &str,
        counter: u32,
        used_at: DateTime<Utc>,
    ) -> Result<bool> {
        let rows = self.conn().execute(
            "UPDATE passkeys SET counter = ?1, last_used_at = ?2 WHERE id = ?3 AND counter < ?1",
            params![counter, format_datetime(&used_at), id],
        )?;
        Ok(rows > 0)
    }

    fn flag_passkey_clone(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE passkeys SET clone_suspected = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    fn delete_passkey(&self, user_id: &str, id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM passkeys WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows > 0)
    }

    // Room operations

    fn create_room(
        &self,
        room: &Room,
        owner: &RoomParticipant,
        permissions: &RoomPermissions,
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let result = tx.execute(
            &format!(
                "INSERT INTO rooms ({ROOM_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
            ),
            params![
                room.id,
                room.name,
                room.created_by,
                room.admin_id,
                room.is_active,
                room.is_public,
                room.mode.as_str(),
                room.max_participants,
                room.settings.allow_chat,
                room.settings.allow_video,
                room.settings.allow_audio,
                room.settings.require_approval,
                room.settings.e2ee,
                format_datetime(&room.created_at),
                format_datetime(&room.updated_at),
                format_datetime(&room.expires_at),
            ],
        );

        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Err(Error::RoomNameTaken),
            Err(e) => return Err(Error::from(e)),
        }

        tx.execute(
            "INSERT INTO room_participants (id, room_id, user_id, joined_at, left_at, is_active,
                is_approved, is_muted, is_video_off, is_chat_blocked, is_banned, is_on_stage)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                owner.id,
                owner.room_id,
                owner.user_id,
                format_datetime(&owner.joined_at),
                owner.is_active,
                owner.is_approved,
                owner.is_muted,
                owner.is_video_off,
                owner.is_chat_blocked,
                owner.is_banned,
                owner.is_on_stage,
            ],
        )?;

        tx.execute(
            &format!(
                "INSERT INTO room_permissions ({PERMISSION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                permissions.room_id,
                permissions.user_id,
                permissions.is_admin,
                permissions.can_kick,
                permissions.can_mute_audio,
                permissions.can_disable_video,
                permissions.can_chat,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn get_room(&self, id: &str) -> Result<Option<Room>> {
        self.query_room(&format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?1"), id)
    }

    fn get_room_by_name(&self, name: &str) -> Result<Option<Room>> {
        self.query_room(&format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE name = ?1"), name)
    }

    fn list_rooms(&self) -> Result<Vec<Room>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map([], row_to_room)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_rooms_created_by(&self, user_id: &str) -> Result<Vec<Room>> {
        self.query_rooms(
            &format!(
                "SELECT {ROOM_COLUMNS} FROM rooms WHERE created_by = ?1
                 ORDER BY created_at DESC"
            ),
            user_id,
        )
    }

    fn list_rooms_participated_by(&self, user_id: &str) -> Result<Vec<Room>> {
        self.query_rooms(
            &format!(
                "SELECT {ROOM_COLUMNS} FROM rooms
                 WHERE id IN (SELECT room_id FROM room_participants WHERE user_id = ?1)
                 ORDER BY created_at DESC"
            ),
            user_id,
        )
    }

    fn update_room_settings(&self, room_id: &str, settings: &RoomSettings) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE rooms SET allow_chat = ?1, allow_video = ?2, allow_audio = ?3,
                require_approval = ?4, e2ee = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                settings.allow_chat,
                settings.allow_video,
                settings.allow_audio,
                settings.require_approval,
                settings.e2ee,
                format_datetime(&Utc::now()),
                room_id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound("room"));
        }
        Ok(())
    }

    fn delete_room(&self, room_id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM room_permissions WHERE room_id = ?1", params![room_id])?;
        tx.execute("DELETE FROM room_participants WHERE room_id = ?1", params![room_id])?;
        let rows = tx.execute("DELETE FROM rooms WHERE id = ?1", params![room_id])?;

        tx.commit()?;
        Ok(rows > 0)
    }

    fn deactivate_expired_rooms(&self, now: DateTime<Utc>) -> Result<usize> {
        let now = format_datetime(&now);
        let rows = self.conn().execute(
            "UPDATE rooms SET is_active = 0, updated_at = ?1
             WHERE is_active = 1 AND expires_at <= ?1",
            params![now],
        )?;
        Ok(rows)
    }

    // Participant operations

    fn join_room(&self, req: &JoinRequest<'_>) -> Result<RoomParticipant> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = format_datetime(&req.now);

        match select_participant(&tx, req.room_id, req.user_id)? {
            Some(existing) if existing.is_banned => return Err(Error::Banned),
            Some(existing) => {
                if !existing.is_active
                    && count_active_participants(&tx, req.room_id)? >= req.max_participants
                {
                    return Err(Error::RoomFull);
                }
                tx.execute(
                    "UPDATE room_participants SET is_active = 1, left_at = NULL, joined_at = ?1
                     WHERE id = ?2",
                    params![now, existing.id],
                )?;
            }
            None => {
                if count_active_participants(&tx, req.room_id)? >= req.max_participants {
                    return Err(Error::RoomFull);
                }
                tx.execute(
                    "INSERT INTO room_participants (id, room_id, user_id, joined_at, is_active,
                        is_approved)
                     VALUES (?1, ?2, ?3, ?4, 1, ?5)",
                    params![
                        uuid::Uuid::new_v4().to_string(),
                        req.room_id,
                        req.user_id,
                        now,
                        req.approved,
                    ],
                )?;
            }
        }

        let participant = select_participant(&tx, req.room_id, req.user_id)?
            .ok_or(Error::NotFound("participant"))?;

        tx.commit()?;
        Ok(participant)
    }

    fn leave_room(&self, room_id: &str, user_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let rows = self.conn().execute(
            "UPDATE room_participants SET is_active = 0, left_at = ?1
             WHERE room_id = ?2 AND user_id = ?3 AND is_active = 1",
            params![format_datetime(&now), room_id, user_id],
        )?;
        Ok(rows > 0)
    }

    fn kick_participant(&self, room_id: &str, user_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let rows = self.conn().execute(
            "UPDATE room_participants SET is_active = 0, is_banned = 1, left_at = ?1
             WHERE room_id = ?2 AND user_id = ?3",
            params![format_datetime(&now), room_id, user_id],
        )?;
        Ok(rows > 0)
    }

    fn set_participant_flag(
        &self,
        room_id: &str,
        user_id: &str,
        flag: ParticipantFlag,
        value: bool,
    ) -> Result<bool> {
        let sql = format!(
            "UPDATE room_participants SET {} = ?1 WHERE room_id = ?2 AND user_id = ?3",
            flag.column()
        );
        let rows = self.conn().execute(&sql, params![value, room_id, user_id])?;
        Ok(rows > 0)
    }

    fn get_participant(&self, room_id: &str, user_id: &str) -> Result<Option<RoomParticipant>> {
        select_participant(&self.conn(), room_id, user_id)
    }

    fn list_active_participants(&self, room_id: &str) -> Result<Vec<ParticipantProfile>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PARTICIPANT_COLUMNS}, u.name, u.email, u.avatar_url
             FROM room_participants p
             JOIN users u ON u.id = p.user_id
             WHERE p.room_id = ?1 AND p.is_active = 1
             ORDER BY p.joined_at"
        ))?;

        let rows = stmt.query_map(params![room_id], |row| {
            Ok(ParticipantProfile {
                participant: row_to_participant(row)?,
                name: row.get(12)?,
                email: row.get(13)?,
                avatar_url: row.get(14)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Permission operations

    fn get_permissions(&self, room_id: &str, user_id: &str) -> Result<Option<RoomPermissions>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {PERMISSION_COLUMNS} FROM room_permissions
                 WHERE room_id = ?1 AND user_id = ?2"
            ),
            params![room_id, user_id],
            row_to_permissions,
        )
        .optional()
        .map_err(Error::from)
    }

    fn upsert_permissions(&self, permissions: &RoomPermissions) -> Result<()> {
        self.conn().execute(
            &format!(
                "INSERT INTO room_permissions ({PERMISSION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (room_id, user_id) DO UPDATE SET
                    is_admin = excluded.is_admin,
                    can_kick = excluded.can_kick,
                    can_mute_audio = excluded.can_mute_audio,
                    can_disable_video = excluded.can_disable_video,
                    can_chat = excluded.can_chat"
            ),
            params![
                permissions.room_id,
                permissions.user_id,
                permissions.is_admin,
                permissions.can_kick,
                permissions.can_mute_audio,
                permissions.can_disable_video,
                permissions.can_chat,
            ],
        )?;
        Ok(())
    }
}
