//! A short, filesystem-safe random token, used to name staging directories
//! and temporary snapshots.

/// Twelve hex characters, matching the reference tool's `str(uuid4())[-12:]`.
pub fn random_token() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    uuid[uuid.len() - 12..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_twelve_hex_chars() {
        let token = random_token();
        assert_eq!(token.len(), 12);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tokens_are_not_trivially_repeated() {
        assert_ne!(random_token(), random_token());
    }
}
