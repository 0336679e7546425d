//! `HttpIdentityClient` against a loopback HTTP responder.

use console_auth::{
    Credential, HttpIdentityClient, IdentityError, IdentityService, PrincipalId, ProfileUpdate,
    SessionVerifier, VerificationFailure,
};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

struct CannedResponse {
    status: &'static str,
    body: &'static str,
}

/// A request as seen by the responder.
#[derive(Debug)]
struct Recorded {
    request_line: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Serve `responses` in order, one per connection, and report each request.
async fn serve(responses: Vec<CannedResponse>) -> (String, mpsc::UnboundedReceiver<Recorded>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for response in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let recorded = read_request(&mut socket).await;
            let _ = tx.send(recorded);

            let reply = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                response.status,
                response.body.len(),
                response.body
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        }
    });

    (format!("http://{}/api/auth", addr), rx)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Recorded {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buffer.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buffer[header_end..]).to_string();

    Recorded {
        request_line,
        headers,
        body,
    }
}

#[tokio::test]
async fn login_returns_access_token() {
    let (url, mut requests) = serve(vec![CannedResponse {
        status: "200 OK",
        body: r#"{"access_token":"tok-123","token_type":"bearer"}"#,
    }])
    .await;
    let client = HttpIdentityClient::new(&url).unwrap();

    let grant = client.login("alice", "secret").await.unwrap();
    assert_eq!(grant.access_token, "tok-123");

    let request = requests.recv().await.unwrap();
    assert_eq!(request.request_line, "POST /api/auth/login HTTP/1.1");
    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(
        body,
        serde_json::json!({ "username": "alice", "password": "secret" })
    );
}

#[tokio::test]
async fn login_rejection_carries_server_detail() {
    let (url, _requests) = serve(vec![CannedResponse {
        status: "401 Unauthorized",
        body: r#"{"detail":"invalid credentials"}"#,
    }])
    .await;
    let client = HttpIdentityClient::new(&url).unwrap();

    let error = client.login("alice", "wrong").await.unwrap_err();
    assert!(error.is_rejection());
    assert_eq!(error.detail(), "invalid credentials");
}

#[tokio::test]
async fn login_failure_without_detail_uses_fallback_message() {
    let (url, _requests) = serve(vec![CannedResponse {
        status: "500 Internal Server Error",
        body: "oops",
    }])
    .await;
    let client = HttpIdentityClient::new(&url).unwrap();

    let error = client.login("alice", "secret").await.unwrap_err();
    assert!(matches!(error, IdentityError::Status { status: 500, .. }));
    assert_eq!(error.detail(), "Login failed");
}

#[tokio::test]
async fn fetch_profile_sends_bearer_token() {
    let (url, mut requests) = serve(vec![CannedResponse {
        status: "200 OK",
        body: r#"{"id":7,"username":"alice","email":"alice@example.com","is_superuser":false,"preferences":{"theme":"dark"}}"#,
    }])
    .await;
    let client = HttpIdentityClient::new(&url).unwrap();

    let profile = client
        .fetch_profile(&Credential::new("tok-123"))
        .await
        .unwrap();
    assert_eq!(profile.id, PrincipalId::Number(7));
    assert_eq!(profile.preferences["theme"], "dark");

    let request = requests.recv().await.unwrap();
    assert_eq!(request.request_line, "GET /api/auth/me HTTP/1.1");
    assert_eq!(request.header("authorization"), Some("Bearer tok-123"));
}

#[tokio::test]
async fn update_profile_puts_partial_body() {
    let (url, mut requests) = serve(vec![CannedResponse {
        status: "200 OK",
        body: r#"{"id":7,"username":"alice","email":"new@example.com"}"#,
    }])
    .await;
    let client = HttpIdentityClient::new(&url).unwrap();

    let update = ProfileUpdate {
        email: Some("new@example.com".to_string()),
        ..Default::default()
    };
    let profile = client
        .update_profile(&Credential::new("tok-123"), &update)
        .await
        .unwrap();
    assert_eq!(profile.email.as_deref(), Some("new@example.com"));

    let request = requests.recv().await.unwrap();
    assert_eq!(request.request_line, "PUT /api/auth/me HTTP/1.1");
    assert_eq!(request.body, r#"{"email":"new@example.com"}"#);
}

#[tokio::test]
async fn malformed_profile_is_reported() {
    let (url, _requests) = serve(vec![CannedResponse {
        status: "200 OK",
        body: r#"{"user":"alice"}"#,
    }])
    .await;
    let client = HttpIdentityClient::new(&url).unwrap();

    let error = client
        .fetch_profile(&Credential::new("tok"))
        .await
        .unwrap_err();
    assert!(matches!(error, IdentityError::MalformedResponse(_)));
    assert!(error.is_transient());
}

#[tokio::test]
async fn verifier_accepts_naive_timestamps_and_null_preferences() {
    let (url, _requests) = serve(vec![CannedResponse {
        status: "200 OK",
        body: r#"{"id":7,"username":"alice","created_at":"2024-01-01T12:00:00.123456","last_login":null,"preferences":null}"#,
    }])
    .await;
    let verifier = SessionVerifier::new(Arc::new(HttpIdentityClient::new(&url).unwrap()));

    let profile = verifier.verify(&Credential::new("tok")).await.unwrap();
    assert_eq!(profile.username, "alice");
    assert!(profile.created_at.is_some());
    assert!(profile.preferences.is_empty());
}

#[tokio::test]
async fn logout_ignores_error_status() {
    let (url, mut requests) = serve(vec![CannedResponse {
        status: "500 Internal Server Error",
        body: "{}",
    }])
    .await;
    let client = HttpIdentityClient::new(&url).unwrap();

    assert!(client.logout(&Credential::new("tok")).await.is_ok());
    let request = requests.recv().await.unwrap();
    assert_eq!(request.request_line, "POST /api/auth/logout HTTP/1.1");
}

#[tokio::test]
async fn verifier_retries_unavailable_then_succeeds() {
    let (url, mut requests) = serve(vec![
        CannedResponse {
            status: "503 Service Unavailable",
            body: r#"{"detail":"maintenance"}"#,
        },
        CannedResponse {
            status: "503 Service Unavailable",
            body: r#"{"detail":"maintenance"}"#,
        },
        CannedResponse {
            status: "200 OK",
            body: r#"{"id":"u-1","username":"alice"}"#,
        },
    ])
    .await;
    let client = Arc::new(HttpIdentityClient::new(&url).unwrap());
    let verifier = SessionVerifier::new(client);

    let profile = verifier.verify(&Credential::new("tok")).await.unwrap();
    assert_eq!(profile.username, "alice");

    let mut seen = 0;
    while requests.try_recv().is_ok() {
        seen += 1;
    }
    assert_eq!(seen, 3);
}

#[tokio::test]
async fn verifier_stops_on_unauthorized() {
    let (url, _requests) = serve(vec![CannedResponse {
        status: "401 Unauthorized",
        body: r#"{"detail":"Could not validate credentials"}"#,
    }])
    .await;
    let verifier = SessionVerifier::new(Arc::new(HttpIdentityClient::new(&url).unwrap()));

    let result = verifier.verify(&Credential::new("tok")).await;
    assert_eq!(
        result,
        Err(VerificationFailure::Rejected(
            "Could not validate credentials".to_string()
        ))
    );
}
