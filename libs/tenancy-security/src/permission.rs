use std::fmt;
use std::str::FromStr;

/// A named permission granted to the caller (e.g. `ORG_EMPLOYEES_VIEW`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("permission name must be non-empty and contain no whitespace: '{0}'")]
pub struct InvalidPermission(pub String);

impl Permission {
    /// Create a permission from its name.
    ///
    /// # Errors
    /// Returns `InvalidPermission` if the name is empty or contains whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidPermission> {
        let name = name.into();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(InvalidPermission(name));
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Permission {
    type Err = InvalidPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Permission {
    type Error = InvalidPermission;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

impl From<Permission> for String {
    fn from(permission: Permission) -> Self {
        permission.0
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
