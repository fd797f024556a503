use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Staff login joined with its permission group.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StaffAccount {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub group_name: String,
}
