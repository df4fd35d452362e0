//! 工具层：注册表、分发器、参数 Schema 与 get_news 工具

pub mod dispatcher;
pub mod news;
pub mod registry;
pub mod schema;

pub use dispatcher::{DispatchOutcome, ToolDispatcher};
pub use news::{format_articles, Article, GetNewsArgs, NewsApiProvider, NewsProvider, NewsTool};
pub use registry::{Tool, ToolName, ToolRegistry};
pub use schema::parameters_schema_for;
