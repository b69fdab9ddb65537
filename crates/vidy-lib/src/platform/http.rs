//! HTTP client for the platform's SQL API
//!
//! A session is established once by posting credentials to the login
//! endpoint; the session cookie is kept in the client's cookie store and
//! reused for every subsequent query.

use super::{sql, Platform, PlatformError, PlatformResult, Table};
use crate::models::{
    Comment, CommentQuery, DataSource, DataSourceSpec, ModelHandle, ModelSpec, ModelStatus,
    Project,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Path of the SQL query endpoint
const QUERY_PATH: &str = "/api/sql/query";

/// Configuration for connecting to the platform
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Base URL (e.g., "https://cloud.mindsdb.com")
    pub base_url: String,
    /// Account email
    pub email: String,
    /// Account password
    pub password: String,
    /// Path of the login endpoint
    pub login_path: String,
    /// Timeout applied to every HTTP request
    pub request_timeout: Duration,
}

impl PlatformConfig {
    pub fn new(
        base_url: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            email: email.into(),
            password: password.into(),
            login_path: "/cloud/login".to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    column_names: Vec<String>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
    #[serde(default)]
    error_message: Option<String>,
}

/// Platform implementation backed by the SQL-over-HTTP API
pub struct HttpPlatform {
    client: Client,
    base_url: Url,
}

impl HttpPlatform {
    /// Open a session with the platform
    pub async fn connect(config: PlatformConfig) -> PlatformResult<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .build()?;
        let base_url = Url::parse(&config.base_url)?;

        let login_url = base_url.join(&config.login_path)?;
        let response = client
            .post(login_url)
            .json(&LoginRequest {
                email: &config.email,
                password: &config.password,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(PlatformError::Auth { status, message });
        }

        info!(base_url = %base_url, "Connected to ML platform");

        Ok(Self { client, base_url })
    }

    /// Execute a SQL statement and return its result set
    pub async fn query(&self, statement: &str) -> PlatformResult<Table> {
        debug!(statement = %statement, "Executing platform query");

        let url = self.base_url.join(QUERY_PATH)?;
        let response = self
            .client
            .post(url)
            .json(&QueryRequest { query: statement })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        let parsed: QueryResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(PlatformError::Query(format!("HTTP {}: {}", status, body)));
            }
            Err(e) => return Err(PlatformError::MalformedResponse(e.to_string())),
        };

        match parsed.kind.as_str() {
            "table" => Ok(Table::new(parsed.column_names, parsed.data)),
            "ok" => Ok(Table::default()),
            "error" => Err(PlatformError::from_query_message(
                parsed
                    .error_message
                    .unwrap_or_else(|| "unknown error".to_string()),
            )),
            other => Err(PlatformError::MalformedResponse(format!(
                "unexpected response type '{}'",
                other
            ))),
        }
    }
}

fn model_from_row(project: &str, table: &Table, row: usize) -> Option<ModelHandle> {
    let name = table.text(row, "name")?;
    let status = table
        .text(row, "status")
        .map(|s| ModelStatus::parse(&s, table.text(row, "error").as_deref()))
        .unwrap_or_else(|| ModelStatus::Other("unknown".to_string()));

    Some(ModelHandle {
        project: project.to_string(),
        name,
        predict: table.text(row, "predict").unwrap_or_default(),
        status,
    })
}

#[async_trait]
impl Platform for HttpPlatform {
    async fn find_project(&self, name: &str) -> PlatformResult<Option<Project>> {
        let table = self.query(&sql::find_project(name)).await?;
        Ok(table.text(0, "name").map(|name| Project { name }))
    }

    async fn create_project(&self, name: &str) -> PlatformResult<Project> {
        self.query(&sql::create_project(name)?).await?;
        Ok(Project {
            name: name.to_string(),
        })
    }

    async fn find_database(&self, name: &str) -> PlatformResult<Option<DataSource>> {
        let table = self.query(&sql::find_database(name)).await?;
        Ok(table.text(0, "name").map(|name| DataSource {
            name,
            engine: table.text(0, "engine").unwrap_or_default(),
        }))
    }

    async fn create_database(&self, spec: &DataSourceSpec) -> PlatformResult<DataSource> {
        self.query(&sql::create_database(spec)?).await?;
        Ok(DataSource {
            name: spec.name.clone(),
            engine: spec.engine.clone(),
        })
    }

    async fn find_model(&self, project: &str, name: &str) -> PlatformResult<Option<ModelHandle>> {
        let table = self.query(&sql::find_model(project, name)).await?;
        Ok(model_from_row(project, &table, 0))
    }

    async fn create_model(&self, project: &str, spec: &ModelSpec) -> PlatformResult<ModelHandle> {
        let table = self.query(&sql::create_model(project, spec)?).await?;

        // Newer platform versions answer with the model's row; older ones with "ok"
        Ok(model_from_row(project, &table, 0).unwrap_or_else(|| ModelHandle {
            project: project.to_string(),
            name: spec.name.clone(),
            predict: spec.predict.clone(),
            status: ModelStatus::Generating,
        }))
    }

    async fn model_status(&self, project: &str, name: &str) -> PlatformResult<ModelStatus> {
        self.find_model(project, name)
            .await?
            .map(|model| model.status)
            .ok_or_else(|| PlatformError::NotFound(format!("model {}.{}", project, name)))
    }

    async fn fetch_comments(
        &self,
        source: &DataSource,
        query: &CommentQuery,
    ) -> PlatformResult<Vec<Comment>> {
        let table = self
            .query(&sql::select_comments(&source.name, query)?)
            .await?;
        if table.column_index("comment").is_none() && !table.is_empty() {
            return Err(PlatformError::MissingColumn("comment".to_string()));
        }

        Ok((0..table.len())
            .map(|row| Comment {
                display_name: table.text(row, "display_name").unwrap_or_default(),
                username: table.text(row, "username").unwrap_or_default(),
                comment: table.text(row, "comment").unwrap_or_default(),
            })
            .collect())
    }

    async fn predict_comments(
        &self,
        model: &ModelHandle,
        source: &DataSource,
        query: &CommentQuery,
    ) -> PlatformResult<Table> {
        self.query(&sql::predict_comments(
            &model.project,
            &model.name,
            &source.name,
            query,
        )?)
        .await
    }

    async fn predict_row(
        &self,
        model: &ModelHandle,
        inputs: &Map<String, Value>,
    ) -> PlatformResult<Table> {
        self.query(&sql::predict_row(&model.project, &model.name, inputs)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    async fn connected(server: &mockito::ServerGuard) -> HttpPlatform {
        HttpPlatform::connect(PlatformConfig::new(server.url(), "user@example.com", "secret"))
            .await
            .unwrap()
    }

    #[test]
    fn test_platform_config_defaults() {
        let config = PlatformConfig::new("https://cloud.mindsdb.com", "a", "b");
        assert_eq!(config.login_path, "/cloud/login");
        assert_eq!(config.request_timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_connect_posts_credentials() {
        let mut server = mockito::Server::new_async().await;
        let login = server
            .mock("POST", "/cloud/login")
            .match_body(Matcher::Json(json!({
                "email": "user@example.com",
                "password": "secret"
            })))
            .with_status(200)
            .with_header("set-cookie", "session=abc; Path=/")
            .create_async()
            .await;

        connected(&server).await;
        login.assert_async().await;
    }

    #[tokio::test]
    async fn test_connect_rejected_credentials() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/cloud/login")
            .with_status(401)
            .with_body("invalid credentials")
            .create_async()
            .await;

        let result =
            HttpPlatform::connect(PlatformConfig::new(server.url(), "user@example.com", "bad"))
                .await;

        match result {
            Err(PlatformError::Auth { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid credentials");
            }
            _ => panic!("expected auth error"),
        }
    }

    #[tokio::test]
    async fn test_query_session_cookie_is_reused() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/cloud/login")
            .with_status(200)
            .with_header("set-cookie", "session=abc; Path=/")
            .create_async()
            .await;
        let query = server
            .mock("POST", "/api/sql/query")
            .match_header("cookie", Matcher::Regex("session=abc".to_string()))
            .with_status(200)
            .with_body(r#"{"type": "ok"}"#)
            .create_async()
            .await;

        let platform = connected(&server).await;
        let table = platform.query("CREATE PROJECT vidy").await.unwrap();

        assert!(table.is_empty());
        query.assert_async().await;
    }

    #[tokio::test]
    async fn test_find_model_parses_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/cloud/login")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("POST", "/api/sql/query")
            .match_body(Matcher::PartialJson(json!({
                "query": sql::find_model("vidy", "spam_classifier_model")
            })))
            .with_body(
                json!({
                    "type": "table",
                    "column_names": ["NAME", "PREDICT", "STATUS", "ERROR"],
                    "data": [["spam_classifier_model", "spam", "training", null]]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let platform = connected(&server).await;
        let model = platform
            .find_model("vidy", "spam_classifier_model")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(model.name, "spam_classifier_model");
        assert_eq!(model.predict, "spam");
        assert_eq!(model.status, ModelStatus::Training);
    }

    #[tokio::test]
    async fn test_find_project_absent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/cloud/login")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("POST", "/api/sql/query")
            .with_body(r#"{"type": "table", "column_names": ["NAME"], "data": []}"#)
            .create_async()
            .await;

        let platform = connected(&server).await;
        assert!(platform.find_project("vidy").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_error_classification() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/cloud/login")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("POST", "/api/sql/query")
            .match_body(Matcher::PartialJson(json!({ "query": "CREATE PROJECT vidy" })))
            .with_body(
                r#"{"type": "error", "error_code": 0, "error_message": "Project 'vidy' already exists"}"#,
            )
            .create_async()
            .await;
        server
            .mock("POST", "/api/sql/query")
            .match_body(Matcher::PartialJson(json!({ "query": "CREATE PROJECT broken" })))
            .with_body(r#"{"type": "error", "error_message": "storage unavailable"}"#)
            .create_async()
            .await;

        let platform = connected(&server).await;

        let err = platform.create_project("vidy").await.unwrap_err();
        assert!(err.is_already_exists());

        let err = platform.create_project("broken").await.unwrap_err();
        assert!(matches!(err, PlatformError::Query(m) if m == "storage unavailable"));
    }

    #[tokio::test]
    async fn test_non_json_server_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/cloud/login")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("POST", "/api/sql/query")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let platform = connected(&server).await;
        let err = platform.query("SELECT 1").await.unwrap_err();
        assert!(matches!(err, PlatformError::Query(m) if m.contains("502")));
    }

    #[tokio::test]
    async fn test_fetch_comments() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/cloud/login")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("POST", "/api/sql/query")
            .with_body(
                json!({
                    "type": "table",
                    "column_names": ["display_name", "username", "comment"],
                    "data": [
                        ["Ann", "@ann", "Loved it"],
                        ["Bob", "@bob", "Too long"]
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let platform = connected(&server).await;
        let source = DataSource {
            name: "mindsdb_youtube".to_string(),
            engine: "youtube".to_string(),
        };
        let comments = platform
            .fetch_comments(
                &source,
                &CommentQuery {
                    video_id: "abc".to_string(),
                    limit: 2,
                },
            )
            .await
            .unwrap();

        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].comment, "Loved it");
        assert_eq!(comments[1].username, "@bob");
    }
}
