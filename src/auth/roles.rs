use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A capability flag carried by a role bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "can_manage_users")]
    ManageUsers,
    #[serde(rename = "can_view_logs")]
    ViewLogs,
    #[serde(rename = "can_use_all_models")]
    UseAllModels,
    #[serde(rename = "can_upload_files")]
    UploadFiles,
    #[serde(rename = "can_modify_workspace")]
    ModifyWorkspace,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManageUsers => "can_manage_users",
            Self::ViewLogs => "can_view_logs",
            Self::UseAllModels => "can_use_all_models",
            Self::UploadFiles => "can_upload_files",
            Self::ModifyWorkspace => "can_modify_workspace",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability flags plus a daily request quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDefinition {
    #[serde(default)]
    pub can_manage_users: bool,
    #[serde(default)]
    pub can_view_logs: bool,
    #[serde(default)]
    pub can_use_all_models: bool,
    #[serde(default)]
    pub can_upload_files: bool,
    #[serde(default)]
    pub can_modify_workspace: bool,
    pub daily_limit: u32,
}

impl RoleDefinition {
    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::ManageUsers => self.can_manage_users,
            Capability::ViewLogs => self.can_view_logs,
            Capability::UseAllModels => self.can_use_all_models,
            Capability::UploadFiles => self.can_upload_files,
            Capability::ModifyWorkspace => self.can_modify_workspace,
        }
    }
}

/// The configured set of roles, keyed by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet {
    roles: BTreeMap<String, RoleDefinition>,
}

pub const ADMIN_ROLE: &str = "Admin";
pub const DEFAULT_ROLE: &str = "User";

impl RoleSet {
    pub fn new(roles: BTreeMap<String, RoleDefinition>) -> Self {
        Self { roles }
    }

    /// Admin, Developer, Manager and User.
    pub fn builtin() -> Self {
        let role = |manage, logs, all_models, upload, workspace, daily_limit| RoleDefinition {
            can_manage_users: manage,
            can_view_logs: logs,
            can_use_all_models: all_models,
            can_upload_files: upload,
            can_modify_workspace: workspace,
            daily_limit,
        };

        Self::new(BTreeMap::from([
            (ADMIN_ROLE.to_string(), role(true, true, true, true, true, 1000)),
            ("Developer".to_string(), role(false, false, true, true, true, 500)),
            ("Manager".to_string(), role(true, true, false, false, false, 200)),
            (DEFAULT_ROLE.to_string(), role(false, false, false, false, false, 100)),
        ]))
    }

    pub fn get(&self, name: &str) -> Option<&RoleDefinition> {
        self.roles.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_limits() {
        let roles = RoleSet::builtin();
        assert_eq!(roles.get("Admin").unwrap().daily_limit, 1000);
        assert_eq!(roles.get("Developer").unwrap().daily_limit, 500);
        assert_eq!(roles.get("Manager").unwrap().daily_limit, 200);
        assert_eq!(roles.get("User").unwrap().daily_limit, 100);
        assert!(roles.get("admin").is_none());
    }

    #[test]
    fn manager_can_manage_but_not_upload() {
        let roles = RoleSet::builtin();
        let manager = roles.get("Manager").unwrap();
        assert!(manager.allows(Capability::ManageUsers));
        assert!(manager.allows(Capability::ViewLogs));
        assert!(!manager.allows(Capability::UploadFiles));
    }

    #[test]
    fn missing_flags_default_to_false() {
        let def: RoleDefinition = serde_json::from_str(r#"{"daily_limit": 5}"#).unwrap();
        assert!(!def.allows(Capability::ManageUsers));
        assert!(!def.allows(Capability::ModifyWorkspace));
    }

    #[test]
    fn capability_names_match_role_flags() {
        for cap in [
            Capability::ManageUsers,
            Capability::ViewLogs,
            Capability::UseAllModels,
            Capability::UploadFiles,
            Capability::ModifyWorkspace,
        ] {
            assert_eq!(serde_json::to_value(cap).unwrap(), cap.as_str());
        }
    }
}
