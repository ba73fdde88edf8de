//! Typed clients built on a pooled [`Connection`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::llm::{Summary, SummaryRequest};
use crate::services::connection::Connection;

async fn call_json<Req, Resp>(
    conn: &dyn Connection,
    method: &str,
    request: &Req,
) -> Result<Resp, ServiceError>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    let bad_payload = |e: serde_json::Error| ServiceError::CallFailed {
        name: conn.name().to_string(),
        method: method.to_string(),
        reason: e.to_string(),
    };

    let payload = serde_json::to_value(request).map_err(bad_payload)?;
    let reply = conn.call(method, payload).await?;
    serde_json::from_value(reply).map_err(bad_payload)
}

/// Client for the summarization service.
#[derive(Clone)]
pub struct SummaryClient {
    conn: Arc<dyn Connection>,
}

impl SummaryClient {
    /// Wrap a pooled connection.
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }

    /// Ask the service to summarize `request`.
    pub async fn summarize(&self, request: &SummaryRequest) -> Result<Summary, ServiceError> {
        call_json(self.conn.as_ref(), "summarize", request).await
    }
}

/// Todo application that receives created tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoApp {
    Todoist,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoTask {
    pub app: TodoApp,
    pub subject: String,
    pub body: String,
}

impl TodoTask {
    /// A Todoist task with the given subject and body.
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            app: TodoApp::Todoist,
            subject: subject.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedTask {
    /// Identifier assigned by the todo app, when it reports one.
    #[serde(default)]
    pub id: Option<String>,
}

/// Client for the todo service.
#[derive(Clone)]
pub struct TodoClient {
    conn: Arc<dyn Connection>,
}

impl TodoClient {
    /// Wrap a pooled connection.
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }

    /// Create a task in the todo app.
    pub async fn create_task(&self, task: &TodoTask) -> Result<CreatedTask, ServiceError> {
        call_json(self.conn.as_ref(), "create_task", task).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Sqlite,
}

#[derive(Debug, Serialize)]
struct CreateIfNotExist<'a> {
    #[serde(rename = "type")]
    kind: DatabaseKind,
    path: &'a str,
}

#[derive(Debug, Deserialize)]
struct Empty {}

/// Client for the database service.
#[derive(Clone)]
pub struct DatabaseClient {
    conn: Arc<dyn Connection>,
}

impl DatabaseClient {
    /// Wrap a pooled connection.
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }

    /// Ask the database service to create a SQLite database at `path`
    /// unless one already exists there.
    pub async fn create_if_not_exist(&self, path: &str) -> Result<(), ServiceError> {
        let request = CreateIfNotExist {
            kind: DatabaseKind::Sqlite,
            path,
        };
        let _: Empty = call_json(self.conn.as_ref(), "create_if_not_exist", &request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::llm::{ModelFamily, ModelId};
    use crate::services::connection::ServingStatus;
    use crate::services::testing::{Behavior, MockConnection};

    fn mock(name: &str) -> Arc<MockConnection> {
        MockConnection::new(name, Behavior::Always(ServingStatus::Serving))
    }

    #[tokio::test]
    async fn summarize_round_trips_through_call() {
        let conn = mock("llm").with_reply(json!({
            "summary": "Pay the invoice by Friday.",
            "model": "gemini-2.5-flash-lite"
        }));
        let client = SummaryClient::new(conn.clone());

        let request = SummaryRequest::new(ModelFamily::Gemini, "Summarize:", "Invoice attached");
        let summary = client.summarize(&request).await.unwrap();

        assert_eq!(summary.summary, "Pay the invoice by Friday.");
        assert_eq!(summary.model, ModelId::Gemini25FlashLite);

        let calls = conn.calls.lock().unwrap();
        assert_eq!(calls[0].0, "summarize");
        assert_eq!(calls[0].1["family"], "gemini");
        assert_eq!(calls[0].1["text"], "Invoice attached");
        assert!(calls[0].1.get("model").is_none());
    }

    #[tokio::test]
    async fn summarize_rejects_malformed_reply() {
        let conn = mock("llm").with_reply(json!({"unexpected": true}));
        let client = SummaryClient::new(conn);

        let request = SummaryRequest::new(ModelFamily::Gemini, "p", "t");
        let err = client.summarize(&request).await.unwrap_err();
        assert!(
            matches!(err, ServiceError::CallFailed { ref name, ref method, .. } if name == "llm" && method == "summarize")
        );
    }

    #[tokio::test]
    async fn create_task_sends_todo() {
        let conn = mock("todo").with_reply(json!({"id": "42"}));
        let client = TodoClient::new(conn.clone());

        let created = client
            .create_task(&TodoTask::new("Invoice", "Pay by Friday"))
            .await
            .unwrap();

        assert_eq!(created.id.as_deref(), Some("42"));
        let calls = conn.calls.lock().unwrap();
        assert_eq!(calls[0].0, "create_task");
        assert_eq!(
            calls[0].1,
            json!({"app": "todoist", "subject": "Invoice", "body": "Pay by Friday"})
        );
    }

    #[tokio::test]
    async fn create_if_not_exist_sends_sqlite_path() {
        let conn = mock("database").with_reply(json!({}));
        let client = DatabaseClient::new(conn.clone());

        client.create_if_not_exist("/data/inbox.db").await.unwrap();

        let calls = conn.calls.lock().unwrap();
        assert_eq!(calls[0].0, "create_if_not_exist");
        assert_eq!(calls[0].1, json!({"type": "sqlite", "path": "/data/inbox.db"}));
    }
}
