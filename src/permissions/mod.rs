//! Static role hierarchy and resource/action permission matrix.
//!
//! The matrix is built once at startup and shared immutably; every check is a
//! pure lookup, safe for unsynchronized concurrent reads. Unknown roles,
//! resources or actions all resolve to "not allowed" (fail-closed).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;

/// Fixed role set, in declaration order. Priority ties (which the role table
/// does not currently contain) are broken by this declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    User,
    Guest,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Manager, Role::User, Role::Guest];

    pub fn priority(&self) -> u32 {
        match self {
            Role::Admin => 100,
            Role::Manager => 80,
            Role::User => 50,
            Role::Guest => 10,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::User => "user",
            Role::Guest => "guest",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Role::Admin => "System administrator with full access",
            Role::Manager => "Department manager with management access",
            Role::User => "Regular user with standard access",
            Role::Guest => "Guest with read-only access",
        }
    }

    pub fn from_code(code: &str) -> Option<Role> {
        Role::ALL.iter().copied().find(|r| r.code() == code)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "code": self.code(),
            "description": self.description(),
            "priority": self.priority(),
        })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    User,
    Data,
    Report,
    Setting,
}

impl Resource {
    pub const ALL: [Resource; 4] = [Resource::User, Resource::Data, Resource::Report, Resource::Setting];

    pub fn name(&self) -> &'static str {
        match self {
            Resource::User => "user",
            Resource::Data => "data",
            Resource::Report => "report",
            Resource::Setting => "setting",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];

    pub fn name(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }

    /// REST mapping used by the permission middleware to derive the declared
    /// action from the route's HTTP method.
    pub fn from_method(method: &axum::http::Method) -> Option<Action> {
        use axum::http::Method;
        match *method {
            Method::POST => Some(Action::Create),
            Method::GET | Method::HEAD => Some(Action::Read),
            Method::PUT | Method::PATCH => Some(Action::Update),
            Method::DELETE => Some(Action::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable (resource, action) → allowed-roles table plus the role hierarchy.
#[derive(Debug)]
pub struct PermissionMatrix {
    entries: HashMap<(Resource, Action), Vec<Role>>,
}

impl PermissionMatrix {
    /// Build the standard EcoHub matrix.
    pub fn standard() -> Self {
        use Action::*;
        use Role::*;

        let mut entries: HashMap<(Resource, Action), Vec<Role>> = HashMap::new();
        let mut set = |res, act, roles: &[Role]| {
            entries.insert((res, act), roles.to_vec());
        };

        set(Resource::User, Create, &[Admin, Manager]);
        set(Resource::User, Read, &[Admin, Manager, User]);
        set(Resource::User, Update, &[Admin, Manager]);
        set(Resource::User, Delete, &[Admin]);

        set(Resource::Data, Create, &[Admin, Manager, User]);
        set(Resource::Data, Read, &[Admin, Manager, User, Guest]);
        set(Resource::Data, Update, &[Admin, Manager, User]);
        set(Resource::Data, Delete, &[Admin, Manager]);

        set(Resource::Report, Create, &[Admin, Manager, User]);
        set(Resource::Report, Read, &[Admin, Manager, User, Guest]);
        set(Resource::Report, Update, &[Admin, Manager, User]);
        set(Resource::Report, Delete, &[Admin, Manager]);

        set(Resource::Setting, Create, &[Admin]);
        set(Resource::Setting, Read, &[Admin, Manager]);
        set(Resource::Setting, Update, &[Admin]);
        set(Resource::Setting, Delete, &[Admin]);

        Self { entries }
    }

    /// The role itself plus every role of strictly lower priority.
    pub fn roles_reachable_from(&self, role: Role) -> Vec<Role> {
        Role::ALL
            .iter()
            .copied()
            .filter(|r| *r == role || r.priority() < role.priority())
            .collect()
    }

    /// True iff the matrix has an entry for (resource, action) and some role
    /// reachable from `role` appears in it.
    pub fn is_allowed(&self, role: Role, resource: Resource, action: Action) -> bool {
        let Some(allowed) = self.entries.get(&(resource, action)) else {
            return false;
        };
        let reachable = self.roles_reachable_from(role);
        allowed.iter().any(|r| reachable.contains(r))
    }

    /// Full permission map for one role, e.g. for `GET /api/auth/permissions`.
    pub fn permissions_for(&self, role: Role) -> Value {
        let mut map = serde_json::Map::new();
        for resource in Resource::ALL {
            let mut actions = serde_json::Map::new();
            for action in Action::ALL {
                actions.insert(
                    action.name().to_string(),
                    Value::Bool(self.is_allowed(role, resource, action)),
                );
            }
            map.insert(resource.name().to_string(), Value::Object(actions));
        }
        Value::Object(map)
    }
}
