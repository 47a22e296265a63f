use std::collections::BTreeMap;

use tracing::warn;

use crate::infra::db::PoolManager;
use crate::models::schema::DataSource;

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub columns: Vec<String>,
    pub referred_table: String,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKey>,
    pub column_error: bool,
    pub fk_error: bool,
}

/// 每次请求现场重建的 schema 快照，构建完成后只读
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    pub tables: Vec<TableSchema>,
}

/// 构建 schema 目录，可限定表子集。
/// 逐表的列/外键探测互相独立，单表失败只降级为占位文本，不会中断整体构建。
pub async fn build_catalog(
    pm: &PoolManager,
    source: &DataSource,
    include: Option<&[String]>,
) -> anyhow::Result<SchemaCatalog> {
    let table_names: Vec<String> = match include {
        Some(list) => list.to_vec(),
        None => pm.list_tables(source).await?,
    };

    let mut tables = Vec::with_capacity(table_names.len());
    for name in table_names {
        let (columns, column_error) = match pm.list_columns(source, &name).await {
            Ok(cols) if !cols.is_empty() => (
                cols.into_iter()
                    .map(|(n, t)| ColumnInfo {
                        name: n,
                        data_type: t,
                    })
                    .collect(),
                false,
            ),
            Ok(_) => {
                warn!("表 {} 未探测到任何列", name);
                (Vec::new(), true)
            }
            Err(e) => {
                warn!("表 {} 列探测失败: {}", name, e);
                (Vec::new(), true)
            }
        };

        let (foreign_keys, fk_error) = match pm.list_foreign_keys(source, &name).await {
            Ok(rows) => (group_foreign_keys(rows), false),
            Err(e) => {
                warn!("表 {} 外键探测失败: {}", name, e);
                (Vec::new(), true)
            }
        };

        tables.push(TableSchema {
            name,
            columns,
            foreign_keys,
            column_error,
            fk_error,
        });
    }
    Ok(SchemaCatalog { tables })
}

/// 把 (约束名, 列名, 被引用表) 的平铺行聚合成外键条目，按约束名排序保证确定性
fn group_foreign_keys(rows: Vec<(String, String, String)>) -> Vec<ForeignKey> {
    let mut grouped: BTreeMap<String, ForeignKey> = BTreeMap::new();
    for (constraint, column, referred) in rows {
        grouped
            .entry(constraint)
            .or_insert_with(|| ForeignKey {
                columns: Vec::new(),
                referred_table: referred,
            })
            .columns
            .push(column);
    }
    grouped.into_values().collect()
}

/// 朴素的相关表筛选：表名在提问里出现即视为相关。
/// 一个都没命中时退回目录序前三张表，保证非空输入必有非空输出。
/// TODO: 换成 embedding 相似度排序，宽 schema 下前三张表的兜底太随意
pub fn pick_tables(question: &str, all_tables: &[String]) -> Vec<String> {
    let q = question.to_lowercase();
    let relevant: Vec<String> = all_tables
        .iter()
        .filter(|t| q.contains(&t.to_lowercase()))
        .cloned()
        .collect();
    if relevant.is_empty() {
        all_tables.iter().take(3).cloned().collect()
    } else {
        relevant
    }
}

/// 把目录渲染成给模型看的 schema 文本
pub fn render_schema_text(catalog: &SchemaCatalog) -> String {
    let mut lines = Vec::new();
    for t in &catalog.tables {
        lines.push(format!("Table: {}", t.name));
        if t.column_error {
            lines.push("  - [error retrieving columns]".to_string());
        } else {
            for c in &t.columns {
                lines.push(format!("  - {} ({})", c.name, c.data_type));
            }
        }
        if t.fk_error {
            lines.push("  * [error retrieving foreign keys]".to_string());
        } else {
            for fk in &t.foreign_keys {
                lines.push(format!(
                    "  * FK: {} -> {}",
                    fk.columns.join(", "),
                    fk.referred_table
                ));
            }
        }
        lines.push(String::new());
    }
    lines.join("\n").trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn picks_tables_named_in_question() {
        let all = tables(&["orders", "site", "country", "address"]);
        let picked = pick_tables("show me ORDERS by country", &all);
        assert_eq!(picked, tables(&["orders", "country"]));
    }

    #[test]
    fn falls_back_to_first_three_on_no_match() {
        let all = tables(&["orders", "site", "country", "address"]);
        let picked = pick_tables("what happened last week", &all);
        assert_eq!(picked, tables(&["orders", "site", "country"]));
    }

    #[test]
    fn selection_is_deterministic() {
        let all = tables(&["orders", "site"]);
        assert_eq!(
            pick_tables("anything", &all),
            pick_tables("anything", &all)
        );
    }

    #[test]
    fn empty_table_list_yields_empty_selection() {
        assert!(pick_tables("question", &[]).is_empty());
    }

    #[test]
    fn renders_columns_and_grouped_foreign_keys() {
        let catalog = SchemaCatalog {
            tables: vec![TableSchema {
                name: "orders".to_string(),
                columns: vec![
                    ColumnInfo {
                        name: "id".to_string(),
                        data_type: "integer".to_string(),
                    },
                    ColumnInfo {
                        name: "account_no".to_string(),
                        data_type: "varchar".to_string(),
                    },
                ],
                foreign_keys: group_foreign_keys(vec![
                    (
                        "fk_account".to_string(),
                        "account_no".to_string(),
                        "customer_account".to_string(),
                    ),
                    (
                        "fk_account".to_string(),
                        "account_region".to_string(),
                        "customer_account".to_string(),
                    ),
                ]),
                column_error: false,
                fk_error: false,
            }],
        };
        let text = render_schema_text(&catalog);
        assert!(text.contains("Table: orders"));
        assert!(text.contains("  - id (integer)"));
        assert!(text.contains("  * FK: account_no, account_region -> customer_account"));
    }

    #[test]
    fn failed_introspection_renders_placeholders() {
        let catalog = SchemaCatalog {
            tables: vec![TableSchema {
                name: "ghost".to_string(),
                columns: Vec::new(),
                foreign_keys: Vec::new(),
                column_error: true,
                fk_error: true,
            }],
        };
        let text = render_schema_text(&catalog);
        assert!(text.contains("[error retrieving columns]"));
        assert!(text.contains("[error retrieving foreign keys]"));
    }
}
