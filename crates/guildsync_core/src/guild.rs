//! Raw guild records as returned by `GET /users/@me/guilds`.

use derive_getters::Getters;
use serde::{Deserialize, Deserializer, Serialize};

/// A guild the user belongs to, as Discord reports it.
///
/// `permissions` is the user's permission bitfield in that guild. Discord
/// sends it as a decimal string; older payloads and test fixtures sometimes
/// use a bare number, so both are accepted.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, derive_setters::Setters,
)]
#[setters(prefix = "with_", into, strip_option)]
pub struct RawGuild {
    /// Guild snowflake id
    #[setters(skip)]
    id: String,
    /// Guild name
    #[setters(skip)]
    name: String,
    /// Icon hash
    #[serde(default)]
    icon: Option<String>,
    /// Whether the user owns the guild
    #[serde(default)]
    owner: bool,
    /// Permission bitfield as a decimal string
    #[serde(default, deserialize_with = "deserialize_permissions")]
    permissions: Option<String>,
}

impl RawGuild {
    /// Create a guild record with no icon, no ownership and no permissions.
    ///
    /// # Example
    ///
    /// ```
    /// use guildsync_core::RawGuild;
    ///
    /// let guild = RawGuild::new("123", "Slime Club").with_owner(true);
    /// assert!(*guild.owner());
    /// ```
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: None,
            owner: false,
            permissions: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PermissionsRepr {
    Text(String),
    Number(u64),
}

fn deserialize_permissions<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let repr = Option::<PermissionsRepr>::deserialize(deserializer)?;
    Ok(repr.map(|r| match r {
        PermissionsRepr::Text(text) => text,
        PermissionsRepr::Number(n) => n.to_string(),
    }))
}
