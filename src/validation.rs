use rand::seq::SliceRandom as _;
use rand::Rng;

use crate::error::{AppError, Result};

const FORBIDDEN_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

pub fn validate_instance_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AppError::invalid_name(name, "name cannot be empty"));
    }
    if name.starts_with('.') {
        return Err(AppError::invalid_name(name, "name cannot start with '.'"));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(AppError::invalid_name(name, "name cannot contain whitespace"));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(AppError::invalid_name(
            name,
            &format!("name cannot contain '{}'", c),
        ));
    }
    if name.chars().any(char::is_control) {
        return Err(AppError::invalid_name(
            name,
            "name cannot contain control characters",
        ));
    }
    Ok(())
}

const ADJECTIVES: [&str; 16] = [
    "amber", "brisk", "calm", "dusty", "eager", "fuzzy", "gentle", "hollow", "icy", "jolly",
    "lucky", "mellow", "nimble", "quiet", "rusty", "sunny",
];

const NOUNS: [&str; 16] = [
    "badger", "cedar", "delta", "ember", "falcon", "grove", "harbor", "island", "juniper",
    "kestrel", "lagoon", "meadow", "otter", "pine", "river", "willow",
];

/// Random `adjective-noun` name for instances created without one.
pub fn random_instance_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("calm");
    let noun = NOUNS.choose(rng).copied().unwrap_or("otter");
    format!("{}-{}", adjective, noun)
}
