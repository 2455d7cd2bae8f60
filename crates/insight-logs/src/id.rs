//! Record id generation

use rand::Rng;

/// Random id of `length` characters sampled uniformly from `alphabet`
///
/// Characters are drawn with replacement. Uniqueness is not guaranteed here;
/// the writer checks every candidate against the record store.
pub fn generate_id<R: Rng + ?Sized>(rng: &mut R, alphabet: &str, length: usize) -> String {
    let chars: Vec<char> = alphabet.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    (0..length)
        .map(|_| chars[rng.random_range(0..chars.len())])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ID_ALPHABET, ID_LENGTH};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    #[test]
    fn test_length_and_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let id = generate_id(&mut rng, ID_ALPHABET, ID_LENGTH);
            assert_eq!(id.len(), 12);
            assert!(id.chars().all(|c| ID_ALPHABET.contains(c)));
        }
    }

    #[test]
    fn test_seeded_is_deterministic() {
        let a = generate_id(&mut StdRng::seed_from_u64(42), ID_ALPHABET, ID_LENGTH);
        let b = generate_id(&mut StdRng::seed_from_u64(42), ID_ALPHABET, ID_LENGTH);
        assert_eq!(a, b);
    }

    #[test]
    fn test_ids_rarely_collide() {
        let mut rng = rand::rng();
        let ids: HashSet<String> = (0..1_000)
            .map(|_| generate_id(&mut rng, ID_ALPHABET, ID_LENGTH))
            .collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn test_single_letter_alphabet() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(generate_id(&mut rng, "x", 4), "xxxx");
        assert_eq!(generate_id(&mut rng, "", 4), "");
    }
}
