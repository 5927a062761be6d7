//! Mapping raw guilds plus verification results to the application shape.
//!
//! Role precedence:
//! 1. Guild owner, or ADMINISTRATOR / MANAGE_GUILD permission bits: `admin`
//! 2. Primary guild with member role data: role allowlists decide
//!    `admin`, `club` or `member`
//! 3. Otherwise `member`

use crate::RawGuild;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// ADMINISTRATOR permission bit.
pub const ADMINISTRATOR: u64 = 0x8;
/// MANAGE_GUILD permission bit.
pub const MANAGE_GUILD: u64 = 0x20;

/// Role label shown to the application.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum RoleLabel {
    /// Can manage the guild
    #[display("admin")]
    Admin,
    /// Holds a club role in the primary guild
    #[display("club")]
    Club,
    /// Everyone else
    #[display("member")]
    Member,
}

/// Which signal decided the role label.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum RoleSource {
    /// Ownership or permission bits
    #[display("permissions")]
    Permissions,
    /// Member roles in the primary guild
    #[display("roles")]
    Roles,
    /// No elevating signal
    #[display("default")]
    Default,
}

/// Outcome of the per-guild verification calls.
///
/// `member_roles` is `None` when no role data is available, either because
/// the lookup was not made or because it failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Getters)]
pub struct Verification {
    bot_installed: bool,
    member_roles: Option<Vec<String>>,
}

impl Verification {
    /// Build a verification result.
    pub fn new(bot_installed: bool, member_roles: Option<Vec<String>>) -> Self {
        Self {
            bot_installed,
            member_roles,
        }
    }

    /// Conservative result used when verification could not be made.
    pub fn not_installed() -> Self {
        Self::default()
    }
}

/// Primary guild and the role allowlists used to label its members.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Getters, derive_builder::Builder,
)]
#[builder(setter(into), default)]
pub struct RolePolicy {
    /// Guild whose member roles are consulted
    primary_guild_id: Option<String>,
    /// Role ids that grant `admin` in the primary guild
    admin_role_ids: HashSet<String>,
    /// Role ids that grant `club` in the primary guild
    club_role_ids: HashSet<String>,
}

impl RolePolicy {
    /// Create a builder for a role policy.
    pub fn builder() -> RolePolicyBuilder {
        RolePolicyBuilder::default()
    }

    /// Whether `guild_id` is the primary guild.
    pub fn is_primary(&self, guild_id: &str) -> bool {
        self.primary_guild_id.as_deref() == Some(guild_id)
    }

    /// Label from primary-guild role ids. Admin roles win over club roles.
    pub fn label_from_roles(&self, roles: &[String]) -> RoleLabel {
        if roles.iter().any(|r| self.admin_role_ids.contains(r)) {
            RoleLabel::Admin
        } else if roles.iter().any(|r| self.club_role_ids.contains(r)) {
            RoleLabel::Club
        } else {
            RoleLabel::Member
        }
    }
}

/// Guild entry handed to the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedGuild {
    id: String,
    name: String,
    icon: Option<String>,
    bot_installed: bool,
    connectable: bool,
    is_primary: bool,
    role_label: RoleLabel,
    role_source: RoleSource,
    /// Older clients read `role`; same as `role_label`.
    role: RoleLabel,
    /// Older clients read `installed`; same as `bot_installed`.
    installed: bool,
    /// Older clients read `botInGuild`; same as `bot_installed`.
    bot_in_guild: bool,
}

/// Whether a permission bitfield grants ADMINISTRATOR or MANAGE_GUILD.
///
/// Unparseable or absent bitfields grant nothing.
///
/// # Example
///
/// ```
/// use guildsync_core::has_admin_or_manage_permission;
///
/// assert!(has_admin_or_manage_permission(Some("8")));
/// assert!(has_admin_or_manage_permission(Some("32")));
/// assert!(!has_admin_or_manage_permission(Some("1024")));
/// assert!(!has_admin_or_manage_permission(Some("not-a-number")));
/// assert!(!has_admin_or_manage_permission(None));
/// ```
pub fn has_admin_or_manage_permission(permissions: Option<&str>) -> bool {
    permissions
        .and_then(|p| p.trim().parse::<u128>().ok())
        .is_some_and(|bits| bits & u128::from(ADMINISTRATOR | MANAGE_GUILD) != 0)
}

/// Map a raw guild and its verification result to a [`NormalizedGuild`].
pub fn normalize_guild(
    guild: &RawGuild,
    verification: &Verification,
    policy: &RolePolicy,
) -> NormalizedGuild {
    let is_primary = policy.is_primary(guild.id());

    let (role_label, role_source) =
        if *guild.owner() || has_admin_or_manage_permission(guild.permissions().as_deref()) {
            (RoleLabel::Admin, RoleSource::Permissions)
        } else if let (true, Some(roles)) = (is_primary, verification.member_roles()) {
            (policy.label_from_roles(roles), RoleSource::Roles)
        } else {
            (RoleLabel::Member, RoleSource::Default)
        };

    let bot_installed = *verification.bot_installed();
    NormalizedGuild {
        id: guild.id().clone(),
        name: guild.name().clone(),
        icon: guild.icon().clone(),
        bot_installed,
        connectable: bot_installed,
        is_primary,
        role_label,
        role_source,
        role: role_label,
        installed: bot_installed,
        bot_in_guild: bot_installed,
    }
}
