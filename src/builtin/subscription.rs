use crate::builtin::User;
use crate::record::{LifecycleHooks, Record};
use crate::schema::{FieldDecl, Operation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Web-push subscription owned by a user. Not listable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Subscription {
    pub id: i64,
    pub endpoint: String,
    pub auth: String,
    pub p256dh: String,
    pub user_id: Option<i64>,
    /// Present only when preloaded.
    #[serde(rename = "User", skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for Subscription {
    const TYPE_NAME: &'static str = "Subscription";
    const TABLE_NAME: &'static str = "subscriptions";
    const TITLE: &'static str = "Subscriptions";
    const API_PATH: &'static str = "/api/subscription";
    const DISPLAY_COLUMN: &'static str = "endpoint";
    const OPERATIONS: &'static [Operation] = &[Operation::Get, Operation::Create, Operation::Update, Operation::Delete];

    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::integer("ID").json("id").hidden(),
            FieldDecl::text("Endpoint").json("endpoint"),
            FieldDecl::text("Auth").json("auth"),
            FieldDecl::text("P256dh").json("p256dh"),
            FieldDecl::integer("UserId").json("user_id,string,omitempty").hidden(),
            FieldDecl::relation("User", "User", "user_id"),
            FieldDecl::datetime("CreatedAt").json("created_at").hidden().db_default("NOW()"),
        ]
    }
}

impl LifecycleHooks for Subscription {}
