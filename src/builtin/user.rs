use crate::error::HookError;
use crate::record::{LifecycleHooks, Record};
use crate::schema::FieldDecl;
use serde::{Deserialize, Serialize};

/// Replaces the stored password in everything handed back to callers.
pub const PASSWORD_MASK: &str = "****";

pub const ROLES: &[&str] = &["Admin", "Scraper"];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: i64,
    #[serde(rename = "username")]
    pub name: String,
    pub password: String,
    pub role: String,
}

impl Record for User {
    const TYPE_NAME: &'static str = "User";
    const TABLE_NAME: &'static str = "users";
    const TITLE: &'static str = "Users";
    const API_PATH: &'static str = "/api/user";
    const DISPLAY_COLUMN: &'static str = "username";

    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::integer("ID").json("id").hidden(),
            FieldDecl::text("Name").json("username").unique(),
            FieldDecl::text("Password").json("password").sensitive(),
            FieldDecl::text("Role").json("role").enumeration(ROLES),
        ]
    }
}

impl LifecycleHooks for User {
    fn pre_update(&mut self) -> Result<(), HookError> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(HookError::invalid("username is required"));
        }
        if !self.role.is_empty() && !ROLES.contains(&self.role.as_str()) {
            return Err(HookError::invalid(format!("unknown role '{}'", self.role)));
        }
        Ok(())
    }

    fn post_load(&mut self) {
        self.password = PASSWORD_MASK.to_string();
    }
}
