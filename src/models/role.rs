use serde::{Deserialize, Serialize};

/// Permission tier stored in `user_roles`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Editor,
    CatalogManager,
    PartnersManager,
    /// Default tier; `reader` rows are read as this
    #[serde(alias = "reader")]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::CatalogManager => "catalog_manager",
            Role::PartnersManager => "partners_manager",
            Role::User => "user",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "editor" => Some(Role::Editor),
            "catalog_manager" => Some(Role::CatalogManager),
            "partners_manager" => Some(Role::PartnersManager),
            "user" | "reader" => Some(Role::User),
            _ => None,
        }
    }

    /// Admin implies everything; every other role grants only its own area.
    pub fn capabilities(&self) -> Capabilities {
        match self {
            Role::Admin => Capabilities {
                manage_pages: true,
                manage_products: true,
                manage_partners: true,
                manage_users: true,
            },
            Role::Editor => Capabilities {
                manage_pages: true,
                ..Capabilities::none()
            },
            Role::CatalogManager => Capabilities {
                manage_products: true,
                ..Capabilities::none()
            },
            Role::PartnersManager => Capabilities {
                manage_partners: true,
                ..Capabilities::none()
            },
            Role::User => Capabilities::none(),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::from_str(s).ok_or(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub manage_pages: bool,
    pub manage_products: bool,
    pub manage_partners: bool,
    pub manage_users: bool,
}

impl Capabilities {
    pub const fn none() -> Self {
        Self {
            manage_pages: false,
            manage_products: false,
            manage_partners: false,
            manage_users: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub user_id: String,
    pub role: Role,
    pub created_at: i64,
}
