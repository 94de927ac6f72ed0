//! Minimal Bitly v4 client: create a bitlink, then tag it.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::debug;

/// Tag attached to every link created through the relay.
pub const INBOX_TAG: &str = "superhuman-inbox-fav";

const USER_AGENT: &str = concat!("link-relay/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum BitlyError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A bitlink as returned by `POST /v4/bitlinks`.
///
/// Fields the relay does not look at are kept in `extra` and passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bitlink {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Bitlink {
    pub fn is_tagged(&self) -> bool {
        self.tags.as_ref().is_some_and(|tags| !tags.is_empty())
    }
}

/// Upstream link-shortening service.
pub trait LinkShortener: Send + Sync {
    fn create(
        &self,
        token: &str,
        long_url: &str,
    ) -> impl Future<Output = Result<Bitlink, BitlyError>> + Send;

    fn add_tags(
        &self,
        token: &str,
        id: &str,
        tags: &[&str],
    ) -> impl Future<Output = Result<(), BitlyError>> + Send;
}

/// Create a bitlink for `long_url` and make sure it carries [`INBOX_TAG`].
///
/// Links that come back already tagged are returned untouched.
pub async fn shorten_and_tag<S: LinkShortener>(
    shortener: &S,
    token: &str,
    long_url: &str,
) -> Result<Bitlink, BitlyError> {
    let mut link = shortener.create(token, long_url).await?;
    if link.is_tagged() {
        debug!(id = %link.id, "bitlink already tagged");
        return Ok(link);
    }
    shortener.add_tags(token, &link.id, &[INBOX_TAG]).await?;
    link.tags = Some(vec![INBOX_TAG.to_string()]);
    Ok(link)
}

pub struct BitlyClient {
    http: reqwest::Client,
    base: String,
}

impl BitlyClient {
    pub fn new(base: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            base: base.into(),
        })
    }

    async fn check(url: &str, response: reqwest::Response) -> Result<reqwest::Response, BitlyError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BitlyError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

impl LinkShortener for BitlyClient {
    async fn create(&self, token: &str, long_url: &str) -> Result<Bitlink, BitlyError> {
        let url = format!("{}/v4/bitlinks", self.base);
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "long_url": long_url }))
            .send()
            .await
            .map_err(|source| BitlyError::Transport {
                url: url.clone(),
                source,
            })?;
        let response = Self::check(&url, response).await?;
        let link: Bitlink = response
            .json()
            .await
            .map_err(|source| BitlyError::Decode {
                url: url.clone(),
                source,
            })?;
        debug!(id = %link.id, long_url, "created bitlink");
        Ok(link)
    }

    async fn add_tags(&self, token: &str, id: &str, tags: &[&str]) -> Result<(), BitlyError> {
        let url = format!("{}/v4/bitlinks/{id}", self.base);
        let response = self
            .http
            .patch(&url)
            .bearer_auth(token)
            .json(&json!({ "tags": tags }))
            .send()
            .await
            .map_err(|source| BitlyError::Transport {
                url: url.clone(),
                source,
            })?;
        Self::check(&url, response).await?;
        debug!(id, ?tags, "tagged bitlink");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode, header};
    use axum::routing::{patch, post};
    use axum::{Json, response::IntoResponse};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[derive(Clone, Default)]
    struct Recorded {
        requests: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
    }

    async fn fake_create(
        State(rec): State<Recorded>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> impl IntoResponse {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        rec.requests
            .lock()
            .unwrap()
            .push(("POST /v4/bitlinks".into(), auth, body.clone()));
        if body["long_url"] == "https://example.com/denied" {
            return (StatusCode::FORBIDDEN, Json(json!({"message": "FORBIDDEN"})));
        }
        (
            StatusCode::CREATED,
            Json(json!({
                "id": "bit.ly/3xyz",
                "link": "https://bit.ly/3xyz",
                "long_url": body["long_url"],
                "created_at": "2024-01-01T00:00:00+0000",
                "deeplinks": [],
            })),
        )
    }

    async fn fake_tag(
        State(rec): State<Recorded>,
        Path(id): Path<String>,
        Json(body): Json<Value>,
    ) -> StatusCode {
        rec.requests
            .lock()
            .unwrap()
            .push((format!("PATCH /v4/bitlinks/{id}"), None, body));
        StatusCode::OK
    }

    async fn fake_bitly() -> (String, Recorded) {
        let rec = Recorded::default();
        let app = Router::new()
            .route("/v4/bitlinks", post(fake_create))
            .route("/v4/bitlinks/{*id}", patch(fake_tag))
            .with_state(rec.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), rec)
    }

    #[tokio::test]
    async fn creates_then_tags_against_bitly_api() {
        let (base, rec) = fake_bitly().await;
        let client = BitlyClient::new(base).unwrap();

        let link = shorten_and_tag(&client, "secret", "https://example.com/photo")
            .await
            .unwrap();
        assert_eq!(link.id, "bit.ly/3xyz");
        assert_eq!(link.tags, Some(vec![INBOX_TAG.to_string()]));
        assert_eq!(link.extra["created_at"], "2024-01-01T00:00:00+0000");

        let requests = rec.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].0, "POST /v4/bitlinks");
        assert_eq!(requests[0].1.as_deref(), Some("Bearer secret"));
        assert_eq!(requests[0].2, json!({"long_url": "https://example.com/photo"}));
        assert_eq!(requests[1].0, "PATCH /v4/bitlinks/bit.ly/3xyz");
        assert_eq!(requests[1].2, json!({"tags": [INBOX_TAG]}));
    }

    #[tokio::test]
    async fn error_status_is_reported_with_body() {
        let (base, rec) = fake_bitly().await;
        let client = BitlyClient::new(base).unwrap();

        let err = shorten_and_tag(&client, "secret", "https://example.com/denied")
            .await
            .unwrap_err();
        match err {
            BitlyError::Status { status, body, .. } => {
                assert_eq!(status, 403);
                assert!(body.contains("FORBIDDEN"), "{body}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(rec.requests.lock().unwrap().len(), 1, "no tag call after a failed create");
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let raw = json!({
            "id": "bit.ly/a",
            "link": "https://bit.ly/a",
            "tags": ["keep"],
            "references": {"group": "https://api-ssl.bitly.com/v4/groups/x"},
        });
        let link: Bitlink = serde_json::from_value(raw.clone()).unwrap();
        assert!(link.is_tagged());
        assert_eq!(serde_json::to_value(&link).unwrap(), raw);
    }
}
