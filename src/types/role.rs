use std::fmt;

use serde::{Deserialize, Serialize};

/// Global account role. Ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    User,
    Moderator,
    Admin,
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Guest,
        Role::User,
        Role::Moderator,
        Role::Admin,
        Role::SuperAdmin,
    ];

    /// Returns true if holding this role is enough for `required`.
    #[must_use]
    pub fn satisfies(self, required: Role) -> bool {
        self >= required
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
            Role::SuperAdmin => "superadmin",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "guest" => Some(Role::Guest),
            "user" => Some(Role::User),
            "moderator" => Some(Role::Moderator),
            "admin" => Some(Role::Admin),
            "superadmin" => Some(Role::SuperAdmin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True if any role in the set satisfies `required`. Duplicates are harmless.
#[must_use]
pub fn roles_satisfy(roles: &[Role], required: Role) -> bool {
    roles.iter().any(|r| r.satisfies(required))
}

/// Sorts and removes duplicate roles, keeping the highest first.
#[must_use]
pub fn normalize_roles(mut roles: Vec<Role>) -> Vec<Role> {
    roles.sort_unstable_by(|a, b| b.cmp(a));
    roles.dedup();
    roles
}

/// Parses a comma-separated role list as stored in the database.
/// Unknown entries are dropped.
#[must_use]
pub fn parse_role_list(s: &str) -> Vec<Role> {
    let roles = s.split(',').filter_map(Role::parse).collect();
    normalize_roles(roles)
}

#[must_use]
pub fn format_role_list(roles: &[Role]) -> String {
    roles
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
