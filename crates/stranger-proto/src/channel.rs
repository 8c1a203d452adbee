//! Channel naming conventions.
//!
//! Every user has exactly one private channel, named deterministically from
//! their public key. One well-known channel carries queue-growth
//! notifications for idle matchmakers.

/// Well-known channel on which an enqueue is announced.
pub const USER_JOINED: &str = "user_joined";

/// The private channel for a user, derived from their public key.
pub fn user(public_key: &str) -> String {
    format!("user:{public_key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_channel_is_deterministic() {
        assert_eq!(user("k1"), "user:k1");
        assert_eq!(user("k1"), user("k1"));
        assert_ne!(user("k1"), user("k2"));
    }
}
