//! Conference code generation
//!
//! Codes are three lowercase groups, `abc-defg-hij`. The space holds
//! 26^10 codes, so a collision on the first draw is rare, but the
//! generator still checks uniqueness and gives up after a fixed ceiling.

use rand::Rng;
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::ConferenceCode;

/// Default ceiling on draws before reporting exhaustion
pub const DEFAULT_MAX_ATTEMPTS: u32 = 32;

/// Draw a random code without checking uniqueness
pub fn random_code<R: Rng + ?Sized>(rng: &mut R) -> ConferenceCode {
    let mut code = String::with_capacity(12);
    for (i, len) in ConferenceCode::GROUPS.iter().enumerate() {
        if i > 0 {
            code.push(ConferenceCode::DELIMITER);
        }
        for _ in 0..*len {
            code.push(rng.gen_range(b'a'..=b'z') as char);
        }
    }
    ConferenceCode::from_trusted(code)
}

/// Draw codes until `is_taken` reports a free one
///
/// `is_taken` is usually a store lookup; its errors abort generation.
pub fn generate_unique<R, F>(rng: &mut R, max_attempts: u32, mut is_taken: F) -> Result<ConferenceCode>
where
    R: Rng + ?Sized,
    F: FnMut(&ConferenceCode) -> Result<bool>,
{
    for attempt in 1..=max_attempts {
        let code = random_code(rng);
        if !is_taken(&code)? {
            return Ok(code);
        }
        warn!(attempt, code = %code, "Conference code collision");
    }

    Err(Error::CodeGenerationExhausted {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_match_pattern() {
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let code = random_code(&mut rng);
            assert!(ConferenceCode::is_valid(code.as_str()), "bad code {}", code);
        }
    }

    #[test]
    fn test_retries_past_collisions() {
        let mut rng = rand::thread_rng();
        let mut calls = 0;
        let code = generate_unique(&mut rng, 5, |_| {
            calls += 1;
            Ok(calls < 3)
        })
        .unwrap();
        assert_eq!(calls, 3);
        assert!(ConferenceCode::is_valid(code.as_str()));
    }

    #[test]
    fn test_exhaustion() {
        let mut rng = rand::thread_rng();
        let result = generate_unique(&mut rng, 4, |_| Ok(true));
        assert!(matches!(
            result,
            Err(Error::CodeGenerationExhausted { attempts: 4 })
        ));
    }

    #[test]
    fn test_lookup_errors_propagate() {
        let mut rng = rand::thread_rng();
        let result = generate_unique(&mut rng, 4, |_| Err(Error::NotFound("store".into())));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_skips_taken_codes() {
        let mut rng = rand::thread_rng();
        let mut taken = HashSet::new();
        for _ in 0..50 {
            let code = generate_unique(&mut rng, DEFAULT_MAX_ATTEMPTS, |c| Ok(taken.contains(c))).unwrap();
            assert!(taken.insert(code));
        }
    }
}
