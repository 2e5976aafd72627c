use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "STUDENT",
            Self::Teacher => "TEACHER",
            Self::Admin => "ADMIN",
        }
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "STUDENT" => Ok(Self::Student),
            "TEACHER" => Ok(Self::Teacher),
            "ADMIN" => Ok(Self::Admin),
            other => Err(DomainError::InvariantViolation(format!("unknown role `{other}`"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    SubmitCost,
    ApproveCostL1,
    ApproveCostL2,
    ApproveCostFinal,
    ManageAccounts,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubmitCost => "SUBMIT_COST",
            Self::ApproveCostL1 => "APPROVE_COST_L1",
            Self::ApproveCostL2 => "APPROVE_COST_L2",
            Self::ApproveCostFinal => "APPROVE_COST_FINAL",
            Self::ManageAccounts => "MANAGE_ACCOUNTS",
        }
    }
}

impl FromStr for Permission {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SUBMIT_COST" => Ok(Self::SubmitCost),
            "APPROVE_COST_L1" => Ok(Self::ApproveCostL1),
            "APPROVE_COST_L2" => Ok(Self::ApproveCostL2),
            "APPROVE_COST_FINAL" => Ok(Self::ApproveCostFinal),
            "MANAGE_ACCOUNTS" => Ok(Self::ManageAccounts),
            other => Err(DomainError::InvariantViolation(format!("unknown permission `{other}`"))),
        }
    }
}

/// Identity and permission set supplied by the authentication gateway.
///
/// The workflow trusts this value as given; credential verification happens
/// upstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
    pub permissions: BTreeSet<Permission>,
}

impl Actor {
    pub fn new(
        id: impl Into<String>,
        role: Role,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Self {
        Self { id: UserId(id.into()), role, permissions: permissions.into_iter().collect() }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Parses a comma separated permission list such as
    /// `APPROVE_COST_L1, MANAGE_NOTICES`. Empty segments are ignored, and so
    /// are names outside [`Permission`]: the gateway grants permissions for
    /// other parts of the dashboard that mean nothing here.
    pub fn parse_permissions(raw: &str) -> BTreeSet<Permission> {
        raw.split(',')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .filter_map(|segment| match Permission::from_str(segment) {
                Ok(permission) => Some(permission),
                Err(_) => {
                    debug!(permission = segment, "ignoring permission unknown to cost workflow");
                    None
                }
            })
            .collect()
    }
}

/// Coarse route guard. Admins always pass; everyone else passes on a listed
/// role or on holding any listed permission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessPolicy {
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl AccessPolicy {
    pub fn authenticated() -> Self {
        Self {
            roles: vec![Role::Student, Role::Teacher, Role::Admin],
            permissions: Vec::new(),
        }
    }

    pub fn admin_only() -> Self {
        Self { roles: vec![Role::Admin], permissions: Vec::new() }
    }

    pub fn submitters() -> Self {
        Self {
            roles: vec![Role::Admin, Role::Teacher, Role::Student],
            permissions: vec![Permission::SubmitCost],
        }
    }

    pub fn approvers() -> Self {
        Self {
            roles: vec![Role::Admin, Role::Teacher, Role::Student],
            permissions: vec![
                Permission::ApproveCostL1,
                Permission::ApproveCostL2,
                Permission::ApproveCostFinal,
            ],
        }
    }

    pub fn allows(&self, actor: &Actor) -> bool {
        if actor.role == Role::Admin {
            return true;
        }

        let role_ok = self.roles.is_empty() || self.roles.contains(&actor.role);
        let permission_ok = self.permissions.iter().any(|permission| actor.has_permission(*permission));
        role_ok || permission_ok
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessPolicy, Actor, Permission, Role};

    #[test]
    fn parses_permission_lists_case_insensitively() {
        let parsed = Actor::parse_permissions(" approve_cost_l1,APPROVE_COST_FINAL,, ");

        assert_eq!(parsed.len(), 2);
        assert!(parsed.contains(&Permission::ApproveCostL1));
        assert!(parsed.contains(&Permission::ApproveCostFinal));
    }

    #[test]
    fn skips_permission_names_from_other_modules() {
        let parsed = Actor::parse_permissions("MANAGE_NOTICES, APPROVE_COST_L2,APPROVE_COST_L9");

        assert_eq!(parsed.into_iter().collect::<Vec<_>>(), vec![Permission::ApproveCostL2]);
    }

    #[test]
    fn admin_passes_every_policy() {
        let admin = Actor::new("u-admin", Role::Admin, []);
        assert!(AccessPolicy::admin_only().allows(&admin));
        assert!(AccessPolicy::approvers().allows(&admin));
    }

    #[test]
    fn admin_only_policy_blocks_teachers_even_with_permissions() {
        let teacher = Actor::new("u-teacher", Role::Teacher, [Permission::ApproveCostFinal]);
        assert!(!AccessPolicy::admin_only().allows(&teacher));
    }

    #[test]
    fn listed_permission_is_enough_without_role_match() {
        let policy = AccessPolicy { roles: vec![Role::Admin], permissions: vec![Permission::SubmitCost] };
        let student = Actor::new("u-student", Role::Student, [Permission::SubmitCost]);
        assert!(policy.allows(&student));
    }
}
