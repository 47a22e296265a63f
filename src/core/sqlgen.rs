use crate::core::dates::ResolvedDateRange;
use crate::core::error::PipelineError;
use crate::models::filters::{FilterRecord, OrderAction, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlFlavor {
    Postgres,
    MySql,
}

impl SqlFlavor {
    pub fn from_db_type(db_type: &str) -> Option<Self> {
        match db_type.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" => Some(Self::MySql),
            _ => None,
        }
    }

    fn placeholder(&self, n: usize) -> String {
        match self {
            Self::Postgres => format!("${n}"),
            Self::MySql => "?".to_string(),
        }
    }
}

/// 订单查询的固定连接骨架：订单沿 item / 供应商接口 / 站点 / 地址 /
/// 国家 / 客户账户展开，A/Z 两端地址分别取
const ORDER_QUERY_BASE: &str = "\
select DISTINCT
    si.order_no,
    si.item_no,
    ii.action as order_action,
    oo.order_type as order_type,
    sca.account_no as ban,
    sca.account_name as cust_name,
    itc.description,
    psp.sub_profile_desc,
    si.circuit_id as fro_id,
    scp.cpi_status_code as circuit_status,
    case when sva.cust_site_id is not null
         then concat(aa.address, '  ', aa.city, ' ', aa.state, ' ', aa.country)
         else '' end as customer_prem_address_a,
    case when sva.cust_site_id is not null then ca.country_name else '' end as a_customer_prem_country,
    case when svz.cust_site_id is not null
         then concat(az.address, '  ', az.city, ' ', az.state, ' ', az.country)
         else '' end as customer_prem_address_z,
    case when svz.cust_site_id is not null then cz.country_name else '' end as z_customer_prem_country,
    ii.create_date as created_date
from orders oo
    join sonet_item si on oo.id = si.order_no
    join improv_item ii on ii.id = si.id
    join sonet_vendor_interface sva on sva.side = 'A' and sva.item_id = si.id
    left outer join site sa on sva.cust_site_id = sa.site_id
    left outer join address aa on sa.address_id = aa.address_id
    join sonet_vendor_interface svz on svz.side = 'Z' and svz.item_id = si.id
    left outer join site sz on svz.cust_site_id = sz.site_id
    left outer join address az on sz.address_id = az.address_id
    left outer join country ca on ca.country_alpha3_code = aa.country
    left outer join country cz on cz.country_alpha3_code = az.country
    join profile_sub_profile psp on si.sub_profile_code = psp.id
    join improv_item_catalog itc on itc.item_type = psp.item_type
    join sonet_customer_account sca on sca.account_no = oo.account_no
    join sonet_cpi scp on si.circuit_id = scp.circuit_id";

/// 把校验过的过滤意图并入骨架。所有取值走绑定参数，不做字面量拼接。
/// 子句顺序固定：日期区间、状态、动作；"ALL" 哨兵表示不加对应子句。
pub fn build_order_query(
    filters: &FilterRecord,
    range: &ResolvedDateRange,
    flavor: SqlFlavor,
) -> (String, Vec<String>) {
    let mut sql = String::from(ORDER_QUERY_BASE);
    let mut binds: Vec<String> = Vec::new();

    let (p1, p2) = (flavor.placeholder(1), flavor.placeholder(2));
    match flavor {
        // Postgres 下文本参数要显式转成时间戳才能和 create_date 比较
        SqlFlavor::Postgres => sql.push_str(&format!(
            "\nwhere ii.create_date between {p1}::timestamp and {p2}::timestamp"
        )),
        SqlFlavor::MySql => {
            sql.push_str(&format!("\nwhere ii.create_date between {p1} and {p2}"))
        }
    }
    binds.push(range.start_sql());
    binds.push(range.end_sql());

    if filters.order_status != OrderStatus::All {
        let p = flavor.placeholder(binds.len() + 1);
        sql.push_str(&format!("\n  and oo.order_status = {p}"));
        binds.push(filters.order_status.as_sql().to_string());
    }
    if filters.order_action != OrderAction::All {
        let p = flavor.placeholder(binds.len() + 1);
        sql.push_str(&format!("\n  and ii.action = {p}"));
        binds.push(filters.order_action.as_sql().to_string());
    }

    (sql, binds)
}

/// freeform 模式的执行前把关：模型自撰的语句只放行 SELECT
pub fn ensure_select(statement: &str) -> Result<(), PipelineError> {
    let head = statement.trim_start();
    match head.get(..6) {
        Some(kw) if kw.eq_ignore_ascii_case("select") => Ok(()),
        _ => Err(PipelineError::MalformedCompletion {
            raw: statement.to_string(),
        }),
    }
}
