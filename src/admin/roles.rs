/// Admin roles and the permission vocabulary
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Admin role levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Read-only access to users, companions and analytics
    Viewer,
    /// Can moderate companions
    Moderator,
    /// Can edit and ban users, manage companions and analytics
    Admin,
    /// Full access, can manage other admins
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s.to_lowercase().as_str() {
            "viewer" => Ok(Role::Viewer),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            _ => Err(AppError::Validation(format!("Invalid role: {}", s))),
        }
    }

    /// Check if this role can perform actions requiring another role
    pub fn can_act_as(&self, required: Role) -> bool {
        self >= &required
    }

    /// Permissions granted to a freshly created account with this role
    pub fn default_permissions(&self) -> Vec<Permission> {
        use Permission::*;
        match self {
            Role::SuperAdmin => Permission::ALL.to_vec(),
            Role::Admin => vec![
                ViewUsers,
                EditUsers,
                BanUsers,
                ViewCompanions,
                ModerateCompanions,
                DeleteCompanions,
                ViewAnalytics,
                ExportAnalytics,
                ViewAdmins,
            ],
            Role::Moderator => vec![ViewUsers, ViewCompanions, ModerateCompanions, ViewAnalytics],
            Role::Viewer => vec![ViewUsers, ViewCompanions, ViewAnalytics],
        }
    }
}

/// Fixed permission vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewUsers,
    EditUsers,
    DeleteUsers,
    BanUsers,
    ViewCompanions,
    ModerateCompanions,
    DeleteCompanions,
    ViewAnalytics,
    ExportAnalytics,
    ViewAdmins,
    CreateAdmins,
    EditAdmins,
    DeleteAdmins,
    ViewSystemSettings,
    EditSystemSettings,
}

impl Permission {
    pub const ALL: [Permission; 15] = [
        Permission::ViewUsers,
        Permission::EditUsers,
        Permission::DeleteUsers,
        Permission::BanUsers,
        Permission::ViewCompanions,
        Permission::ModerateCompanions,
        Permission::DeleteCompanions,
        Permission::ViewAnalytics,
        Permission::ExportAnalytics,
        Permission::ViewAdmins,
        Permission::CreateAdmins,
        Permission::EditAdmins,
        Permission::DeleteAdmins,
        Permission::ViewSystemSettings,
        Permission::EditSystemSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewUsers => "view_users",
            Permission::EditUsers => "edit_users",
            Permission::DeleteUsers => "delete_users",
            Permission::BanUsers => "ban_users",
            Permission::ViewCompanions => "view_companions",
            Permission::ModerateCompanions => "moderate_companions",
            Permission::DeleteCompanions => "delete_companions",
            Permission::ViewAnalytics => "view_analytics",
            Permission::ExportAnalytics => "export_analytics",
            Permission::ViewAdmins => "view_admins",
            Permission::CreateAdmins => "create_admins",
            Permission::EditAdmins => "edit_admins",
            Permission::DeleteAdmins => "delete_admins",
            Permission::ViewSystemSettings => "view_system_settings",
            Permission::EditSystemSettings => "edit_system_settings",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| AppError::Validation(format!("Invalid permission: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_hierarchy() {
        assert!(Role::SuperAdmin > Role::Admin);
        assert!(Role::Admin > Role::Moderator);
        assert!(Role::Moderator > Role::Viewer);

        assert!(Role::SuperAdmin.can_act_as(Role::Admin));
        assert!(Role::Admin.can_act_as(Role::Viewer));

        assert!(!Role::Viewer.can_act_as(Role::Moderator));
        assert!(!Role::Admin.can_act_as(Role::SuperAdmin));
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!(Role::from_str("viewer").unwrap(), Role::Viewer);
        assert_eq!(Role::from_str("super_admin").unwrap(), Role::SuperAdmin);
        assert_eq!(Role::from_str("ADMIN").unwrap(), Role::Admin);

        assert!(Role::from_str("superadmin").is_err());
    }

    #[test]
    fn test_default_permissions() {
        assert_eq!(Role::SuperAdmin.default_permissions().len(), Permission::ALL.len());

        let admin = Role::Admin.default_permissions();
        assert!(admin.contains(&Permission::BanUsers));
        assert!(!admin.contains(&Permission::DeleteUsers));
        assert!(!admin.contains(&Permission::CreateAdmins));

        let viewer = Role::Viewer.default_permissions();
        assert_eq!(
            viewer,
            vec![Permission::ViewUsers, Permission::ViewCompanions, Permission::ViewAnalytics]
        );
    }

    #[test]
    fn test_permission_names_round_trip_through_serde() {
        for permission in Permission::ALL {
            let json = serde_json::to_string(&permission).unwrap();
            assert_eq!(json, format!("\"{}\"", permission.as_str()));
            assert_eq!(Permission::from_str(permission.as_str()).unwrap(), permission);
        }
    }
}
