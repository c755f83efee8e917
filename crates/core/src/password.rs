//! Random initial passwords.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";

/// ASCII punctuation without `'`, `-` and `%`, which the provisioning tool
/// rejects in initial passwords.
const PUNCTUATION: &[u8] = b"!\"#$&()*+,./:;<=>?@[\\]^_`{|}~";

/// Every password carries one uppercase, one lowercase and one punctuation
/// character regardless of policy.
pub const MIN_LENGTH: usize = 3;

/// Password composition rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPolicy {
    #[serde(default = "default_length")]
    pub length: usize,
    #[serde(default, alias = "use_uppercase_letters")]
    pub use_uppercase: bool,
    #[serde(default, alias = "use_punctuations")]
    pub use_punctuation: bool,
    #[serde(default)]
    pub use_numbers: bool,
}

fn default_length() -> usize {
    16
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            length: default_length(),
            use_uppercase: false,
            use_punctuation: false,
            use_numbers: false,
        }
    }
}

impl PasswordPolicy {
    pub fn is_valid(&self) -> bool {
        self.length >= MIN_LENGTH
    }

    /// Characters allowed in the non-seed positions.
    fn pool(&self) -> Vec<u8> {
        let mut pool = LOWERCASE.to_vec();
        if self.use_punctuation {
            pool.extend_from_slice(PUNCTUATION);
        }
        if self.use_uppercase {
            pool.extend_from_slice(UPPERCASE);
        }
        if self.use_numbers {
            pool.extend_from_slice(DIGITS);
        }
        pool
    }
}

/// Generate a password with the thread-local RNG.
///
/// A missing or malformed policy falls back to [`PasswordPolicy::default`].
pub fn generate(policy: Option<&PasswordPolicy>) -> String {
    generate_with(policy, &mut rand::thread_rng())
}

/// Generate a password with a caller-supplied RNG.
pub fn generate_with<R: Rng + ?Sized>(policy: Option<&PasswordPolicy>, rng: &mut R) -> String {
    let policy = match policy {
        Some(p) if p.is_valid() => *p,
        Some(p) => {
            warn!(length = p.length, "invalid password policy, using defaults");
            PasswordPolicy::default()
        }
        None => {
            warn!("no password policy available, using defaults");
            PasswordPolicy::default()
        }
    };

    let mut chars: Vec<u8> = Vec::with_capacity(policy.length);
    for seed in [UPPERCASE, LOWERCASE, PUNCTUATION] {
        if let Some(&c) = seed.choose(rng) {
            chars.push(c);
        }
    }

    let pool = policy.pool();
    for _ in MIN_LENGTH..policy.length {
        if let Some(&c) = pool.choose(rng) {
            chars.push(c);
        }
    }

    chars.shuffle(rng);
    chars.into_iter().map(char::from).collect()
}
