use std::{fmt, str::FromStr};

use crate::StoreErr;

/// Identifies one dataset and its sessions on this node.
///
/// The id doubles as the coordinator's host label and as a file name, so it is
/// restricted to ascii letters, digits, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryId(String);

impl RepositoryId {
    /// Validates and wraps a repository id.
    ///
    /// # Arguments
    /// * `id` - The raw id.
    ///
    /// # Returns
    /// The id or `StoreErr::InvalidRepositoryId`.
    pub fn new(id: impl Into<String>) -> Result<Self, StoreErr> {
        let id = id.into();
        let valid = !id.is_empty()
            && id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

        if valid {
            Ok(Self(id))
        } else {
            Err(StoreErr::InvalidRepositoryId(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RepositoryId {
    type Err = StoreErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for RepositoryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_host_label_characters() {
        for id in ["R1", "repo-42", "my_repo", "a"] {
            assert_eq!(RepositoryId::new(id).unwrap().as_str(), id);
        }
    }

    #[test]
    fn rejects_paths_and_empty_ids() {
        for id in ["", "../etc", "a/b", "a.b", "repo id"] {
            assert!(matches!(
                RepositoryId::new(id),
                Err(StoreErr::InvalidRepositoryId(_))
            ));
        }
    }
}
