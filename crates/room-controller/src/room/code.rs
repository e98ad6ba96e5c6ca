//! Random room codes for `POST /v1/rooms`.

use super::{RoomId, RoomRegistry};
use crate::errors::RcError;

use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;

/// Collisions before giving up.
pub const MAX_ROOM_CODE_ATTEMPTS: usize = 16;

/// An uppercase alphanumeric code of `length` characters.
pub fn generate_room_code<R: Rng + ?Sized>(rng: &mut R, length: usize) -> RoomId {
    RoomId::new(&Alphanumeric.sample_string(rng, length))
}

/// A fresh code that does not name any room in `registry`.
///
/// The room itself is not created; that still happens on first join.
pub fn allocate_room_code<R: Rng + ?Sized>(
    rng: &mut R,
    registry: &RoomRegistry,
    length: usize,
) -> Result<RoomId, RcError> {
    for _ in 0..MAX_ROOM_CODE_ATTEMPTS {
        let code = generate_room_code(rng, length);
        if registry.get(&code).is_none() {
            return Ok(code);
        }
    }
    Err(RcError::RoomCodeExhausted(MAX_ROOM_CODE_ATTEMPTS))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_codes_are_uppercase_alphanumeric() {
        let mut rng = StdRng::seed_from_u64(7);

        for length in [4, 7, 32] {
            let code = generate_room_code(&mut rng, length);
            assert_eq!(code.as_str().len(), length);
            assert!(code
                .as_str()
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_allocate_skips_existing_rooms() {
        let mut registry = RoomRegistry::new();
        let taken = generate_room_code(&mut StdRng::seed_from_u64(42), 4);
        registry.get_or_create(&taken);

        let code = allocate_room_code(&mut StdRng::seed_from_u64(42), &registry, 4).unwrap();

        assert_ne!(code, taken);
        assert!(registry.get(&code).is_none());
        // Allocation does not create the room.
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_allocate_gives_up_when_every_attempt_collides() {
        let mut registry = RoomRegistry::new();
        let mut replay = StdRng::seed_from_u64(1);
        for _ in 0..MAX_ROOM_CODE_ATTEMPTS {
            let code = generate_room_code(&mut replay, 4);
            registry.get_or_create(&code);
        }

        let result = allocate_room_code(&mut StdRng::seed_from_u64(1), &registry, 4);

        assert!(matches!(
            result,
            Err(RcError::RoomCodeExhausted(MAX_ROOM_CODE_ATTEMPTS))
        ));
    }
}
