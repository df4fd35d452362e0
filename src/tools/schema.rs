//! 工具参数 JSON Schema 生成（schemars 自动从参数结构体生成）
//!
//! 生成结果直接作为函数工具声明的 `parameters` 字段提交给远程服务。

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 由参数类型生成函数参数 schema，去掉 `$schema` / `title` 等顶层元信息
pub fn parameters_schema_for<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        obj.remove("definitions");
    }
    value
}
