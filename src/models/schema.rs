use serde::{Deserialize, Serialize};

/// 数据源连接描述：name 为来源系统标识 (EON / SALESFORCE / ...)，
/// db_type 取 "postgres" 或 "mysql"
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DataSource {
    pub name: String,
    pub db_type: String,
    pub connection_url: String,
}
