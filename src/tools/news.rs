//! 新闻检索工具（get_news）
//!
//! NewsProvider 抽象第三方新闻搜索；NewsApiProvider 调用 NewsAPI `/everything`，
//! 每次最多取 page_size 条；非 2xx 或网络失败时返回空列表而非报错。
//! NewsTool 把多篇文章格式化后拼接为一段文本，作为单个工具调用的输出。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::schema::parameters_schema_for;
use crate::tools::{Tool, ToolName};

/// 单篇新闻
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Article {
    pub source: Option<String>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub content: Option<String>,
}

impl Article {
    /// 供模型阅读的文本格式：标题、作者、来源、摘要、链接各占一行
    pub fn display(&self) -> String {
        fn field(v: &Option<String>) -> &str {
            v.as_deref().unwrap_or("N/A")
        }
        format!(
            "Title: {},\nAuthor: {},\nSource: {},\nDescription: {},\nURL: {}\n",
            field(&self.title),
            field(&self.author),
            field(&self.source),
            field(&self.description),
            field(&self.url),
        )
    }
}

/// 拼接多篇文章的格式化文本
pub fn format_articles(articles: &[Article]) -> String {
    articles
        .iter()
        .map(Article::display)
        .collect::<Vec<_>>()
        .join("\n")
}

/// 新闻来源 trait：按主题检索文章
#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn lookup(&self, topic: &str) -> Result<Vec<Article>, String>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    total_results: Option<u64>,
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSource {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiArticle {
    source: Option<NewsApiSource>,
    author: Option<String>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    content: Option<String>,
}

impl From<NewsApiArticle> for Article {
    fn from(a: NewsApiArticle) -> Self {
        Self {
            source: a.source.and_then(|s| s.name),
            author: a.author,
            title: a.title,
            description: a.description,
            url: a.url,
            content: a.content,
        }
    }
}

/// NewsAPI 客户端：GET {base_url}/everything?q=&pageSize=&apiKey=
pub struct NewsApiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    page_size: u32,
}

impl NewsApiProvider {
    pub fn new(base_url: &str, api_key: &str, page_size: u32, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("newsdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            page_size,
        }
    }
}

#[async_trait]
impl NewsProvider for NewsApiProvider {
    async fn lookup(&self, topic: &str) -> Result<Vec<Article>, String> {
        let url = format!("{}/everything", self.base_url);
        let page_size = self.page_size.to_string();
        let resp = match self
            .client
            .get(&url)
            .query(&[
                ("q", topic),
                ("pageSize", page_size.as_str()),
                ("apiKey", self.api_key.as_str()),
            ])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "news request failed");
                return Ok(Vec::new());
            }
        };

        if !resp.status().is_success() {
            tracing::warn!(topic = %topic, status = %resp.status(), "news API returned non-success status");
            return Ok(Vec::new());
        }

        let body: NewsApiResponse = resp
            .json()
            .await
            .map_err(|e| format!("Decode news response: {e}"))?;
        tracing::info!(
            topic = %topic,
            status = body.status.as_deref().unwrap_or("unknown"),
            total_results = body.total_results.unwrap_or(0),
            returned = body.articles.len(),
            "news lookup"
        );
        Ok(body
            .articles
            .into_iter()
            .take(self.page_size as usize)
            .map(Article::from)
            .collect())
    }
}

/// get_news 的参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetNewsArgs {
    /// The topic for the news, e.g. bitcoin
    pub topic: String,
}

/// get_news 工具：按主题检索新闻并拼接为一段文本
pub struct NewsTool {
    provider: Arc<dyn NewsProvider>,
}

impl NewsTool {
    pub fn new(provider: Arc<dyn NewsProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Tool for NewsTool {
    fn name(&self) -> ToolName {
        ToolName::GetNews
    }

    fn description(&self) -> &str {
        "Get the list of articles/news for the given topic"
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<GetNewsArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: GetNewsArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {e}"))?;
        let topic = args.topic.trim();
        if topic.is_empty() {
            return Err("Missing topic".to_string());
        }
        let articles = self.provider.lookup(topic).await?;
        if articles.is_empty() {
            return Ok(format!("No articles found for topic '{topic}'."));
        }
        Ok(format_articles(&articles))
    }
}
