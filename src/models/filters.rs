use serde::Serialize;

use crate::core::error::PipelineError;

/// 订单来源系统的固定枚举，取值以各系统的注册名为准
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum SourceSystem {
    #[serde(rename = "EON")]
    Eon,
    #[serde(rename = "PIPELINE")]
    Pipeline,
    #[serde(rename = "SWIFT")]
    Swift,
    #[serde(rename = "SALESFORCE")]
    Salesforce,
    #[serde(rename = "SDP_FOA")]
    SdpFoa,
    #[serde(rename = "SDP_OA")]
    SdpOa,
    #[serde(rename = "SDP_ORION")]
    SdpOrion,
    #[serde(rename = "SERVICENOW_ORDER")]
    ServicenowOrder,
    #[serde(rename = "VLOCITY_ORDER")]
    VlocityOrder,
}

impl SourceSystem {
    pub fn parse(value: &str) -> Result<Self, PipelineError> {
        match value.trim().to_uppercase().as_str() {
            "EON" => Ok(Self::Eon),
            "PIPELINE" => Ok(Self::Pipeline),
            "SWIFT" => Ok(Self::Swift),
            "SALESFORCE" => Ok(Self::Salesforce),
            "SDP_FOA" => Ok(Self::SdpFoa),
            "SDP_OA" => Ok(Self::SdpOa),
            "SDP_ORION" => Ok(Self::SdpOrion),
            "SERVICENOW_ORDER" => Ok(Self::ServicenowOrder),
            "VLOCITY_ORDER" => Ok(Self::VlocityOrder),
            _ => Err(PipelineError::UnknownEnumValue {
                field: "source_system",
                value: value.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eon => "EON",
            Self::Pipeline => "PIPELINE",
            Self::Swift => "SWIFT",
            Self::Salesforce => "SALESFORCE",
            Self::SdpFoa => "SDP_FOA",
            Self::SdpOa => "SDP_OA",
            Self::SdpOrion => "SDP_ORION",
            Self::ServicenowOrder => "SERVICENOW_ORDER",
            Self::VlocityOrder => "VLOCITY_ORDER",
        }
    }
}

/// 订单状态枚举，数据库内的字面量大小写不统一，这里保留原样
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    #[serde(rename = "ALL")]
    All,
    #[serde(rename = "In progress")]
    InProgress,
    #[serde(rename = "entered")]
    Entered,
    #[serde(rename = "cancelled")]
    Cancelled,
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "rejected")]
    Rejected,
    #[serde(rename = "incomplete Entry")]
    IncompleteEntry,
    #[serde(rename = "hiberated activation")]
    HiberatedActivation,
}

impl OrderStatus {
    pub fn parse(value: &str) -> Result<Self, PipelineError> {
        match value.trim().to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "in progress" => Ok(Self::InProgress),
            "entered" => Ok(Self::Entered),
            "cancelled" => Ok(Self::Cancelled),
            "complete" => Ok(Self::Complete),
            "rejected" => Ok(Self::Rejected),
            "incomplete entry" => Ok(Self::IncompleteEntry),
            "hiberated activation" => Ok(Self::HiberatedActivation),
            _ => Err(PipelineError::UnknownEnumValue {
                field: "order_status",
                value: value.to_string(),
            }),
        }
    }

    /// 落库时使用的字面量 (与源系统写入的值一致)
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::InProgress => "In progress",
            Self::Entered => "entered",
            Self::Cancelled => "cancelled",
            Self::Complete => "complete",
            Self::Rejected => "rejected",
            Self::IncompleteEntry => "incomplete Entry",
            Self::HiberatedActivation => "hiberated activation",
        }
    }
}

/// 订单动作枚举
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    #[serde(rename = "ALL")]
    All,
    #[serde(rename = "Install")]
    Install,
    #[serde(rename = "disconnect")]
    Disconnect,
    #[serde(rename = "change")]
    Change,
    #[serde(rename = "legacy")]
    Legacy,
}

impl OrderAction {
    pub fn parse(value: &str) -> Result<Self, PipelineError> {
        match value.trim().to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "install" => Ok(Self::Install),
            "disconnect" => Ok(Self::Disconnect),
            "change" => Ok(Self::Change),
            "legacy" => Ok(Self::Legacy),
            _ => Err(PipelineError::UnknownEnumValue {
                field: "order_action",
                value: value.to_string(),
            }),
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Install => "Install",
            Self::Disconnect => "disconnect",
            Self::Change => "change",
            Self::Legacy => "legacy",
        }
    }
}

/// 从模型输出中抽取出的结构化查询意图。
/// 日期字段先保存自然语言短语，经日期解析后改写为绝对时间戳。
#[derive(Debug, Serialize, Clone)]
pub struct FilterRecord {
    pub source_system: SourceSystem,
    pub order_type: String,
    pub order_status: OrderStatus,
    pub order_action: OrderAction,
    pub start_date: String,
    pub end_date: String,
}
