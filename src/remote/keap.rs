//! Keap REST (v2) implementation of `CrmApi` over reqwest.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method, Request, Response, StatusCode};
use secrecy::{ExposeSecret, SecretBox};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ApiError, CrmApi, PAGE_SIZE};
use crate::config::ApiConfig;
use crate::model::{Contact, Note};
use crate::search;

const API_VERSION_PREFIX: &str = "/v2";
const CORRELATION_HEADER: &str = "x-correlation-id";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const BASE_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Per-request header overrides, applied after the defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: HeaderMap,
}

impl RequestOptions {
    /// Parse `(name, value)` pairs from configuration.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ApiError::InvalidHeader(name.clone()))?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| ApiError::InvalidHeader(name.clone()))?;
            headers.insert(header_name, header_value);
        }
        Ok(Self { headers })
    }
}

#[derive(Debug, Deserialize)]
struct ContactPage {
    #[serde(default)]
    contacts: Vec<Contact>,
}

#[derive(Debug, Deserialize)]
struct NotePage {
    #[serde(default)]
    notes: Vec<Note>,
}

pub struct KeapClient {
    client: Client,
    base_url: String,
    token: SecretBox<String>,
    max_retries: u32,
    overrides: RequestOptions,
}

impl KeapClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(ApiError::Build)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: SecretBox::new(Box::new(config.token.expose_secret().clone())),
            max_retries: config.max_retries,
            overrides: RequestOptions::from_pairs(&config.headers)?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_VERSION_PREFIX, path)
    }

    /// Assemble a request without sending it.
    pub(crate) fn build_request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Vec<u8>>,
        options: &RequestOptions,
        correlation_id: Uuid,
    ) -> Result<Request, ApiError> {
        let mut builder = self
            .client
            .request(method, self.url(path))
            .bearer_auth(self.token.expose_secret())
            .header(CONTENT_TYPE, "application/json")
            .header(CORRELATION_HEADER, correlation_id.to_string());

        if !query.is_empty() {
            builder = builder.query(query);
        }
        builder = builder.headers(options.headers.clone());
        if let Some(body) = body {
            builder = builder.body(body);
        }

        builder.build().map_err(ApiError::Build)
    }

    /// Send a request and decode the JSON response, retrying on 429.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Vec<u8>>,
        options: &RequestOptions,
    ) -> Result<T, ApiError> {
        let correlation_id = Uuid::new_v4();
        let mut attempt = 0;

        loop {
            let request = self.build_request(
                method.clone(),
                path,
                query,
                body.clone(),
                options,
                correlation_id,
            )?;
            debug!(method = %method, path, %correlation_id, attempt, "sending request");

            let response = self
                .client
                .execute(request)
                .await
                .map_err(|source| ApiError::Transport { source, correlation_id })?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.max_retries {
                let delay = retry_delay(attempt, retry_after_secs(&response));
                warn!(
                    path,
                    %correlation_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "rate limited, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                return Err(ApiError::from_status(status, correlation_id));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|source| ApiError::Transport { source, correlation_id })?;
            return decode_body(&bytes).map_err(|source| ApiError::Decode { source, correlation_id });
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        self.execute(Method::GET, path, query, None, &self.overrides).await
    }

    async fn send_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = encode(body)?;
        self.execute(method, path, &[], Some(body), &self.overrides).await
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let _: IgnoredAny = self
            .execute(Method::DELETE, path, &[], None, &self.overrides)
            .await?;
        Ok(())
    }
}

impl CrmApi for KeapClient {
    async fn list_contacts(&self, search: Option<&str>) -> Result<Vec<Contact>, ApiError> {
        let page: ContactPage = self.get("/contacts", &contact_list_query(search)).await?;
        Ok(page.contacts)
    }

    async fn get_contact(&self, id: i64) -> Result<Contact, ApiError> {
        self.get(&format!("/contacts/{id}"), &[]).await
    }

    async fn create_contact(&self, contact: &Contact) -> Result<Contact, ApiError> {
        self.send_json(Method::POST, "/contacts", contact).await
    }

    async fn update_contact(&self, id: i64, patch: &Contact) -> Result<Contact, ApiError> {
        self.send_json(Method::PATCH, &format!("/contacts/{id}"), patch)
            .await
    }

    async fn delete_contact(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/contacts/{id}")).await
    }

    async fn list_notes(&self, contact_id: i64) -> Result<Vec<Note>, ApiError> {
        let page: NotePage = self.get("/notes", &note_list_query(contact_id)).await?;
        Ok(page.notes)
    }

    async fn create_note(&self, note: &Note) -> Result<Note, ApiError> {
        self.send_json(Method::POST, "/notes", note).await
    }

    async fn update_note(&self, id: i64, patch: &Note) -> Result<Note, ApiError> {
        self.send_json(Method::PATCH, &format!("/notes/{id}"), patch)
            .await
    }

    async fn delete_note(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/notes/{id}")).await
    }
}

fn contact_list_query(search: Option<&str>) -> Vec<(&'static str, String)> {
    let mut query = vec![("page_size", PAGE_SIZE.to_string())];
    if let Some(filter) = search.and_then(search::name_filter) {
        query.push(("filter", filter));
    }
    query
}

fn note_list_query(contact_id: i64) -> Vec<(&'static str, String)> {
    vec![
        ("contact_id", contact_id.to_string()),
        ("page_size", PAGE_SIZE.to_string()),
    ]
}

fn encode<B: Serialize>(body: &B) -> Result<Vec<u8>, ApiError> {
    serde_json::to_vec(body).map_err(ApiError::Encode)
}

/// Empty bodies (DELETE) decode as JSON `null`.
fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, serde_json::Error> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        serde_json::from_slice(b"null")
    } else {
        serde_json::from_slice(bytes)
    }
}

fn retry_after_secs(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn retry_delay(attempt: u32, retry_after: Option<u64>) -> Duration {
    match retry_after {
        Some(secs) => Duration::from_secs(secs).min(MAX_BACKOFF),
        None => BASE_BACKOFF
            .saturating_mul(1u32 << attempt.min(16))
            .min(MAX_BACKOFF),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EmailAddress, EMAIL_FIELD};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use reqwest::header::AUTHORIZATION;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn client() -> KeapClient {
        KeapClient::new(&ApiConfig::new(
            "https://api.example.test/crm/rest/",
            "secret-token",
        ))
        .unwrap()
    }

    fn query_pairs(request: &Request) -> Vec<(String, String)> {
        request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn list_request_carries_auth_and_page_size() {
        let client = client();
        let id = Uuid::new_v4();
        let request = client
            .build_request(
                Method::GET,
                "/contacts",
                &contact_list_query(None),
                None,
                &RequestOptions::default(),
                id,
            )
            .unwrap();

        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.url().path(), "/crm/rest/v2/contacts");
        assert_eq!(query_pairs(&request), vec![("page_size".into(), "100".into())]);
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer secret-token");
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(request.headers()[CORRELATION_HEADER], id.to_string().as_str());
        assert!(request.body().is_none());
    }

    #[test]
    fn search_adds_name_filter_after_page_size() {
        let client = client();
        let request = client
            .build_request(
                Method::GET,
                "/contacts",
                &contact_list_query(Some("Smith")),
                None,
                &RequestOptions::default(),
                Uuid::nil(),
            )
            .unwrap();

        assert_eq!(
            query_pairs(&request),
            vec![
                ("page_size".into(), "100".into()),
                (
                    "filter".into(),
                    "given_name~'Smith' OR family_name~'Smith'".into()
                ),
            ]
        );
    }

    #[test]
    fn blank_search_sends_no_filter() {
        assert_eq!(contact_list_query(Some("   ")).len(), 1);
    }

    #[test]
    fn notes_are_listed_by_contact() {
        let client = client();
        let request = client
            .build_request(
                Method::GET,
                "/notes",
                &note_list_query(42),
                None,
                &RequestOptions::default(),
                Uuid::nil(),
            )
            .unwrap();

        assert_eq!(request.url().path(), "/crm/rest/v2/notes");
        assert_eq!(
            query_pairs(&request),
            vec![
                ("contact_id".into(), "42".into()),
                ("page_size".into(), "100".into()),
            ]
        );
    }

    #[test]
    fn create_body_is_json_of_present_fields() {
        let client = client();
        let contact = Contact {
            given_name: Some("A".into()),
            family_name: Some("B".into()),
            email_addresses: Some(vec![EmailAddress {
                email: "a@b.com".into(),
                field: EMAIL_FIELD.into(),
            }]),
            ..Contact::default()
        };
        let request = client
            .build_request(
                Method::POST,
                "/contacts",
                &[],
                Some(encode(&contact).unwrap()),
                &RequestOptions::default(),
                Uuid::nil(),
            )
            .unwrap();

        let bytes = request.body().and_then(|b| b.as_bytes()).unwrap();
        let body: serde_json::Value = serde_json::from_slice(bytes).unwrap();
        assert_eq!(
            body,
            json!({
                "given_name": "A",
                "family_name": "B",
                "email_addresses": [{"email": "a@b.com", "field": "EMAIL1"}]
            })
        );
        assert!(request.url().query().is_none());
    }

    #[test]
    fn header_overrides_replace_defaults() {
        let client = client();
        let options = RequestOptions::from_pairs(&[
            ("Content-Type".into(), "application/merge-patch+json".into()),
            ("X-Keap-API-Key".into(), "abc".into()),
        ])
        .unwrap();
        let request = client
            .build_request(Method::PATCH, "/notes/7", &[], None, &options, Uuid::nil())
            .unwrap();

        assert_eq!(request.headers()[CONTENT_TYPE], "application/merge-patch+json");
        assert_eq!(request.headers()["x-keap-api-key"], "abc");
        assert_eq!(request.headers().get_all(CONTENT_TYPE).iter().count(), 1);
    }

    #[test]
    fn invalid_header_override_is_rejected() {
        let err = RequestOptions::from_pairs(&[("bad header".into(), "x".into())]).unwrap_err();
        assert!(matches!(err, ApiError::InvalidHeader(name) if name == "bad header"));
    }

    #[test]
    fn empty_body_decodes_as_unit() {
        let _: IgnoredAny = decode_body(b"").unwrap();
        let _: () = decode_body(b"  \n").unwrap();
        let page: ContactPage = decode_body(br#"{"contacts":[{"id":1}],"next_page_token":""}"#).unwrap();
        assert_eq!(page.contacts[0].id, Some(1));
        assert!(decode_body::<Contact>(b"").is_err());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(retry_delay(0, None), Duration::from_millis(500));
        assert_eq!(retry_delay(1, None), Duration::from_secs(1));
        assert_eq!(retry_delay(3, None), Duration::from_secs(4));
        assert_eq!(retry_delay(10, None), MAX_BACKOFF);
        assert_eq!(retry_delay(0, Some(3)), Duration::from_secs(3));
        assert_eq!(retry_delay(0, Some(3600)), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let mut config = ApiConfig::new("http://127.0.0.1:1", "t");
        config.timeout = Duration::from_secs(2);
        let client = KeapClient::new(&config).unwrap();

        let err = client.list_contacts(None).await.unwrap_err();
        assert_eq!(err.kind(), "transport");
        assert!(err.correlation_id().is_some());
    }

    fn http_response(status_line: &str, extra: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status_line}\r\n{extra}Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    /// Answer one connection per canned response, in order. Returns the base
    /// URL and the number of requests received.
    async fn serve(responses: Vec<String>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
                let mut request = Vec::new();
                let mut chunk = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&chunk[..n]);
                }
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });

        (format!("http://{addr}"), hits)
    }

    fn local_client(base_url: &str, max_retries: u32) -> KeapClient {
        let mut config = ApiConfig::new(base_url, "t");
        config.timeout = Duration::from_secs(5);
        config.max_retries = max_retries;
        KeapClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn rate_limited_request_is_retried() {
        let (url, hits) = serve(vec![
            http_response("429 Too Many Requests", "Retry-After: 0\r\n", ""),
            http_response("200 OK", "", r#"{"contacts":[{"id":1,"given_name":"Ada"}]}"#),
        ])
        .await;
        let client = local_client(&url, 2);

        let contacts = client.list_contacts(None).await.unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].given_name.as_deref(), Some("Ada"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retries_stop_at_configured_limit() {
        let (url, hits) = serve(vec![
            http_response("429 Too Many Requests", "Retry-After: 0\r\n", ""),
            http_response("429 Too Many Requests", "Retry-After: 0\r\n", ""),
        ])
        .await;
        let client = local_client(&url, 1);

        let err = client.list_contacts(None).await.unwrap_err();
        assert_eq!(err.kind(), "status");
        assert_eq!(err.status(), Some(StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn error_status_carries_code_and_correlation() {
        let (url, hits) = serve(vec![http_response("404 Not Found", "", "")]).await;
        let client = local_client(&url, 2);

        let err = client.get_contact(5).await.unwrap_err();
        assert!(matches!(&err, ApiError::Status { reason, .. } if reason == "Not Found"));
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert!(err.correlation_id().is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
