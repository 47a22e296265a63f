use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Map, Value};
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, MySql, Pool, Postgres, Row, TypeInfo};
use tracing::info;

use crate::models::schema::DataSource;

pub enum DynamicPool {
    Postgres(Pool<Postgres>),
    MySql(Pool<MySql>),
}

/// 按来源系统缓存连接池。池本身负责连接的取还，请求间不共享事务。
pub struct PoolManager {
    pools: DashMap<String, Arc<DynamicPool>>,
}

impl PoolManager {
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
        }
    }

    pub async fn get_or_create_pool(&self, source: &DataSource) -> anyhow::Result<Arc<DynamicPool>> {
        if let Some(pool) = self.pools.get(&source.name) {
            return Ok(pool.clone());
        }
        let new_pool = match source.db_type.to_lowercase().as_str() {
            "postgres" | "postgresql" => {
                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect(&source.connection_url)
                    .await?;
                Arc::new(DynamicPool::Postgres(pool))
            }
            "mysql" => {
                let pool = MySqlPoolOptions::new()
                    .max_connections(5)
                    .connect(&source.connection_url)
                    .await?;
                Arc::new(DynamicPool::MySql(pool))
            }
            _ => return Err(anyhow::anyhow!("Unsupported DB type")),
        };
        info!("已建立数据源连接池: {} ({})", source.name, source.db_type);
        self.pools.insert(source.name.clone(), new_pool.clone());
        Ok(new_pool)
    }

    /// 探测数据源的所有表名
    pub async fn list_tables(&self, source: &DataSource) -> anyhow::Result<Vec<String>> {
        let pool = self.get_or_create_pool(source).await?;
        match &*pool {
            DynamicPool::Postgres(p) => {
                let rows =
                    sqlx::query("SELECT tablename FROM pg_catalog.pg_tables WHERE schemaname = 'public'")
                        .fetch_all(p)
                        .await?;
                Ok(rows
                    .into_iter()
                    .filter_map(|r| r.try_get::<String, _>(0).ok())
                    .collect())
            }
            DynamicPool::MySql(p) => {
                let rows = sqlx::query("SHOW TABLES").fetch_all(p).await?;
                Ok(rows
                    .into_iter()
                    .filter_map(|r| mysql_col_str(&r, 0))
                    .collect())
            }
        }
    }

    /// 探测指定表的列与类型。主路径走 information_schema，
    /// 失败或空结果时回退到各引擎自己的元数据查询。
    pub async fn list_columns(
        &self,
        source: &DataSource,
        table: &str,
    ) -> anyhow::Result<Vec<(String, String)>> {
        let pool = self.get_or_create_pool(source).await?;
        match &*pool {
            DynamicPool::Postgres(p) => {
                let primary = sqlx::query(
                    "SELECT column_name AS column_name, data_type AS data_type \
                     FROM information_schema.columns \
                     WHERE table_schema = 'public' AND table_name = $1 \
                     ORDER BY ordinal_position",
                )
                .bind(table)
                .fetch_all(p)
                .await;
                let rows = match primary {
                    Ok(rows) if !rows.is_empty() => rows,
                    _ => {
                        sqlx::query(
                            "SELECT a.attname AS column_name, \
                                    format_type(a.atttypid, a.atttypmod) AS data_type \
                             FROM pg_catalog.pg_attribute a \
                             JOIN pg_catalog.pg_class c ON a.attrelid = c.oid \
                             WHERE c.relname = $1 AND a.attnum > 0 AND NOT a.attisdropped \
                             ORDER BY a.attnum",
                        )
                        .bind(table)
                        .fetch_all(p)
                        .await?
                    }
                };
                Ok(rows
                    .into_iter()
                    .filter_map(|r| {
                        let name = r.try_get::<String, _>("column_name").ok()?;
                        let ty = r
                            .try_get::<String, _>("data_type")
                            .unwrap_or_else(|_| "unknown".to_string());
                        Some((name, ty))
                    })
                    .collect())
            }
            DynamicPool::MySql(p) => {
                let primary = sqlx::query(
                    "SELECT column_name AS column_name, data_type AS data_type \
                     FROM information_schema.columns \
                     WHERE table_schema = DATABASE() AND table_name = ? \
                     ORDER BY ordinal_position",
                )
                .bind(table)
                .fetch_all(p)
                .await;
                let rows = match primary {
                    Ok(rows) if !rows.is_empty() => rows
                        .into_iter()
                        .filter_map(|r| {
                            let name = mysql_col_str(&r, "column_name")?;
                            let ty = mysql_col_str(&r, "data_type")
                                .unwrap_or_else(|| "unknown".to_string());
                            Some((name, ty))
                        })
                        .collect::<Vec<_>>(),
                    _ => {
                        let rows = sqlx::query(&format!("DESCRIBE {}", table))
                            .fetch_all(p)
                            .await?;
                        rows.into_iter()
                            .filter_map(|r| {
                                let name = mysql_col_str(&r, "Field")?;
                                let ty = mysql_col_str(&r, "Type")
                                    .unwrap_or_else(|| "unknown".to_string());
                                Some((name, ty))
                            })
                            .collect()
                    }
                };
                Ok(rows)
            }
        }
    }

    /// 探测指定表的外键约束，返回 (约束名, 列名, 被引用表)。
    /// 外键探测与列探测互相独立，单独失败由上层降级处理。
    pub async fn list_foreign_keys(
        &self,
        source: &DataSource,
        table: &str,
    ) -> anyhow::Result<Vec<(String, String, String)>> {
        let pool = self.get_or_create_pool(source).await?;
        let rows = match &*pool {
            DynamicPool::Postgres(p) => sqlx::query(
                "SELECT tc.constraint_name AS constraint_name, \
                        kcu.column_name AS column_name, \
                        ccu.table_name AS referred_table \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                   ON tc.constraint_name = kcu.constraint_name \
                  AND tc.table_schema = kcu.table_schema \
                 JOIN information_schema.constraint_column_usage ccu \
                   ON tc.constraint_name = ccu.constraint_name \
                  AND tc.table_schema = ccu.table_schema \
                 WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_name = $1",
            )
            .bind(table)
            .fetch_all(p)
            .await?
            .into_iter()
            .filter_map(|r| {
                Some((
                    r.try_get::<String, _>("constraint_name").ok()?,
                    r.try_get::<String, _>("column_name").ok()?,
                    r.try_get::<String, _>("referred_table").ok()?,
                ))
            })
            .collect(),
            DynamicPool::MySql(p) => sqlx::query(
                "SELECT constraint_name AS constraint_name, \
                        column_name AS column_name, \
                        referenced_table_name AS referred_table \
                 FROM information_schema.key_column_usage \
                 WHERE table_schema = DATABASE() AND table_name = ? \
                   AND referenced_table_name IS NOT NULL",
            )
            .bind(table)
            .fetch_all(p)
            .await?
            .into_iter()
            .filter_map(|r| {
                Some((
                    mysql_col_str(&r, "constraint_name")?,
                    mysql_col_str(&r, "column_name")?,
                    mysql_col_str(&r, "referred_table")?,
                ))
            })
            .collect(),
        };
        Ok(rows)
    }
}

/// 执行最终语句，把每一行物化为 列名 -> 值 的 JSON 映射。
/// 连接从池里借出，无论成败都会在返回时归还。
pub async fn run_query(
    pool: &DynamicPool,
    sql: &str,
    binds: &[String],
) -> Result<Vec<Value>, sqlx::Error> {
    match pool {
        DynamicPool::Postgres(p) => {
            let mut query = sqlx::query(sql);
            for b in binds {
                query = query.bind(b.as_str());
            }
            let rows = query.fetch_all(p).await?;
            Ok(rows.iter().map(pg_row_to_json).collect())
        }
        DynamicPool::MySql(p) => {
            let mut query = sqlx::query(sql);
            for b in binds {
                query = query.bind(b.as_str());
            }
            let rows = query.fetch_all(p).await?;
            Ok(rows.iter().map(mysql_row_to_json).collect())
        }
    }
}

/// MySQL 的元数据列偶尔以二进制返回，按 UTF-8 宽松解码兜底
fn mysql_col_str<I>(row: &MySqlRow, index: I) -> Option<String>
where
    I: sqlx::ColumnIndex<MySqlRow> + Clone,
{
    if let Ok(v) = row.try_get::<String, _>(index.clone()) {
        return Some(v);
    }
    row.try_get::<Vec<u8>, _>(index)
        .ok()
        .map(|b| String::from_utf8_lossy(&b).into_owned())
}

fn pg_row_to_json(row: &PgRow) -> Value {
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        let val = match col.type_info().name() {
            "INT2" | "INT4" => json!(row.try_get::<Option<i32>, _>(name).unwrap_or(None)),
            "INT8" => json!(row.try_get::<Option<i64>, _>(name).unwrap_or(None)),
            "FLOAT4" | "FLOAT8" => json!(row.try_get::<Option<f64>, _>(name).unwrap_or(None)),
            "NUMERIC" => {
                // 金额类字段转字符串，保住精度
                let v: Option<rust_decimal::Decimal> = row.try_get(name).unwrap_or(None);
                json!(v.map(|d| d.to_string()))
            }
            "BOOL" => json!(row.try_get::<Option<bool>, _>(name).unwrap_or(None)),
            "DATE" => json!(row
                .try_get::<Option<chrono::NaiveDate>, _>(name)
                .unwrap_or(None)
                .map(|d| d.to_string())),
            "TIMESTAMP" => json!(row
                .try_get::<Option<chrono::NaiveDateTime>, _>(name)
                .unwrap_or(None)
                .map(|t| t.to_string())),
            "TIMESTAMPTZ" => json!(row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)
                .unwrap_or(None)
                .map(|t| t.to_string())),
            "JSON" | "JSONB" => row
                .try_get::<Option<Value>, _>(name)
                .unwrap_or(None)
                .unwrap_or(Value::Null),
            _ => json!(row.try_get::<Option<String>, _>(name).unwrap_or(None)),
        };
        map.insert(name.to_string(), val);
    }
    Value::Object(map)
}

fn mysql_row_to_json(row: &MySqlRow) -> Value {
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        let val = match col.type_info().name() {
            "TINYINT" | "SMALLINT" | "INT" | "MEDIUMINT" => {
                json!(row.try_get::<Option<i32>, _>(name).unwrap_or(None))
            }
            "BIGINT" => json!(row.try_get::<Option<i64>, _>(name).unwrap_or(None)),
            "FLOAT" | "DOUBLE" => json!(row.try_get::<Option<f64>, _>(name).unwrap_or(None)),
            "DECIMAL" | "NEWDECIMAL" => {
                let v: Option<rust_decimal::Decimal> = row.try_get(name).unwrap_or(None);
                json!(v.map(|d| d.to_string()))
            }
            "DATE" => json!(row
                .try_get::<Option<chrono::NaiveDate>, _>(name)
                .unwrap_or(None)
                .map(|d| d.to_string())),
            "DATETIME" => json!(row
                .try_get::<Option<chrono::NaiveDateTime>, _>(name)
                .unwrap_or(None)
                .map(|t| t.to_string())),
            "TIMESTAMP" => json!(row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)
                .unwrap_or(None)
                .map(|t| t.to_string())),
            _ => json!(row.try_get::<Option<String>, _>(name).unwrap_or(None)),
        };
        map.insert(name.to_string(), val);
    }
    Value::Object(map)
}
