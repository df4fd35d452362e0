//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找。
//! 工具名是封闭枚举 ToolName：远程服务下发的字符串只在解析为 ToolName 时可能出现「未知工具」。

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::ToolDefinition;

/// 本地支持的全部工具
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolName {
    /// 按主题检索新闻文章
    GetNews,
}

impl ToolName {
    pub const ALL: [ToolName; 1] = [ToolName::GetNews];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::GetNews => "get_news",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AgentError::UnknownTool(s.to_string()))
    }
}

/// 工具 trait：名称、描述（供模型理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;

    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 工具注册表：按 ToolName 存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<ToolName, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name(), Arc::new(tool));
    }

    pub fn get(&self, name: ToolName) -> Option<Arc<dyn Tool>> {
        self.tools.get(&name).cloned()
    }

    /// 按远程下发的工具名查找处理器；未知名称或未注册均返回 UnknownTool
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, AgentError> {
        let tool_name: ToolName = name.parse()?;
        self.get(tool_name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))
    }

    /// 校验参数后执行工具；工具自身返回的错误转为 ToolExecutionFailed
    pub async fn invoke(&self, name: &str, args: Value) -> Result<String, AgentError> {
        let tool = self.resolve(name)?;
        validate_args(&tool.parameters_schema(), &args).map_err(|reason| {
            AgentError::InvalidToolArguments {
                tool: name.to_string(),
                reason,
            }
        })?;
        tool.execute(args).await.map_err(AgentError::ToolExecutionFailed)
    }

    pub fn tool_names(&self) -> Vec<ToolName> {
        let mut names: Vec<ToolName> = self.tools.keys().copied().collect();
        names.sort_by_key(|n| n.as_str());
        names
    }

    /// 已注册工具的函数声明，用于创建 Assistant
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tool_names()
            .into_iter()
            .filter_map(|name| self.get(name))
            .map(|tool| {
                ToolDefinition::function(
                    tool.name().as_str(),
                    tool.description(),
                    tool.parameters_schema(),
                )
            })
            .collect()
    }

    /// 校验远程 Assistant 声明的每个函数工具都有本地处理器
    pub fn validate_declared(&self, declared: &[ToolDefinition]) -> Result<(), AgentError> {
        declared
            .iter()
            .filter(|d| d.kind == "function")
            .try_for_each(|d| self.resolve(&d.function.name).map(|_| ()))
    }
}

/// 宽松的参数校验：必须是对象、required 键齐全、声明为 string 的属性必须是字符串
pub(crate) fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    let obj = args
        .as_object()
        .ok_or_else(|| format!("expected a JSON object, got {args}"))?;

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !obj.contains_key(key) {
                return Err(format!("missing required field '{key}'"));
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, prop) in props {
            let declared_string = prop.get("type").and_then(|t| t.as_str()) == Some("string");
            match obj.get(key) {
                Some(v) if declared_string && !v.is_string() => {
                    return Err(format!("field '{key}' must be a string"));
                }
                _ => {}
            }
        }
    }
    Ok(())
}
