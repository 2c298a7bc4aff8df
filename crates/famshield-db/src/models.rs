use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbRule {
    pub id: String,
    pub position: i64,
    pub rule_type: String,
    pub payload: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbKeyword {
    pub position: i64,
    pub keyword: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DbUsageCounter {
    pub day: String,
    pub package_name: String,
    pub seconds: i64,
}
