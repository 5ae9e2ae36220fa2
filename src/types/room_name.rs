use rand::Rng;
use rand::rngs::OsRng;
use thiserror::Error;

pub const MIN_ROOM_NAME_LEN: usize = 3;
pub const MAX_ROOM_NAME_LEN: usize = 63;

const NAME_BLOCKS: [usize; 3] = [3, 4, 3];

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RoomNameError {
    #[error("room name must be at least 3 characters")]
    TooShort,

    #[error("room name must be at most 63 characters")]
    TooLong,

    #[error(
        "room name may only contain lowercase letters, digits and single hyphens between them"
    )]
    InvalidCharacters,
}

/// Trims and lowercases a user-supplied room name.
#[must_use]
pub fn normalize_room_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Checks an already-normalized room name.
pub fn validate_room_name(name: &str) -> Result<(), RoomNameError> {
    if name.len() < MIN_ROOM_NAME_LEN {
        return Err(RoomNameError::TooShort);
    }
    if name.len() > MAX_ROOM_NAME_LEN {
        return Err(RoomNameError::TooLong);
    }

    // Each hyphen-separated segment must be non-empty, which rules out
    // leading, trailing and doubled hyphens.
    let valid = name.split('-').all(|segment| {
        !segment.is_empty()
            && segment
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    });

    if valid {
        Ok(())
    } else {
        Err(RoomNameError::InvalidCharacters)
    }
}

/// Generates a name shaped like `abc-defg-hij` from the OS random source.
#[must_use]
pub fn generate_room_name() -> String {
    let mut rng = OsRng;
    let blocks: Vec<String> = NAME_BLOCKS
        .iter()
        .map(|&len| {
            (0..len)
                .map(|_| char::from(b'a' + rng.gen_range(0..26u8)))
                .collect()
        })
        .collect();
    blocks.join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["abc", "team-sync", "a1-b2-c3", "room42"] {
            assert_eq!(validate_room_name(name), Ok(()), "{name}");
        }
        assert_eq!(validate_room_name(&"a".repeat(63)), Ok(()));
    }

    #[test]
    fn test_length_bounds() {
        assert_eq!(validate_room_name("ab"), Err(RoomNameError::TooShort));
        assert_eq!(validate_room_name(""), Err(RoomNameError::TooShort));
        assert_eq!(
            validate_room_name(&"a".repeat(64)),
            Err(RoomNameError::TooLong)
        );
    }

    #[test]
    fn test_invalid_characters() {
        for name in [
            "-abc", "abc-", "ab--cd", "Abc", "ab_cd", "ab cd", "caf\u{e9}", "a.b.c",
        ] {
            assert_eq!(
                validate_room_name(name),
                Err(RoomNameError::InvalidCharacters),
                "{name}"
            );
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_room_name("  Team-Sync \n"), "team-sync");
    }

    #[test]
    fn test_generated_names_validate() {
        for _ in 0..200 {
            let name = generate_room_name();
            assert_eq!(validate_room_name(&name), Ok(()));

            let blocks: Vec<&str> = name.split('-').collect();
            assert_eq!(blocks.len(), 3);
            assert_eq!(blocks[0].len(), 3);
            assert_eq!(blocks[1].len(), 4);
            assert_eq!(blocks[2].len(), 3);
            assert!(name.bytes().all(|b| b == b'-' || b.is_ascii_lowercase()));
        }
    }
}
