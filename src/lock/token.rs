use std::fmt;

use uuid::Uuid;

/// Credential proving ownership of a write lock.
///
/// A token is generated once per write acquisition and reused for every
/// replica, so a majority of replicas ends up holding the same token. With
/// 122 random bits per token, two concurrent writers generating the same one
/// is negligible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteToken(String);

impl WriteToken {
    pub(crate) fn generate() -> Self {
        WriteToken(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens cross process boundaries (the holder may hand one to whoever is
// responsible for releasing), so they can be rebuilt from a plain string.
impl From<String> for WriteToken {
    fn from(value: String) -> Self {
        WriteToken(value)
    }
}

impl fmt::Display for WriteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
