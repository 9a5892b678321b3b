//! `PortalClient` against a minimal local HTTP server.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use postwatch::portal::{
    ApplyResponse, FetchOutcome, JobSource, PortalClient, PortalConfig, Posting,
};
use postwatch::session::SessionCredential;

/// A request as seen by the test server.
#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    cookie: Option<String>,
    body: String,
}

type Responder = fn(&Recorded) -> (u16, &'static str, String);

/// Serve every connection with `respond`, recording requests.
async fn serve(respond: Responder) -> (String, Arc<Mutex<Vec<Recorded>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    let requests = log.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let requests = requests.clone();
            tokio::spawn(async move {
                let Some(request) = read_request(&mut stream).await else {
                    return;
                };
                let (status, extra_headers, body) = respond(&request);
                requests.lock().push(request);

                let response = format!(
                    "HTTP/1.1 {status} X\r\n{extra_headers}Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    (format!("http://{addr}"), log)
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let mut cookie = None;
    let mut content_length = 0;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        match name.trim().to_ascii_lowercase().as_str() {
            "cookie" => cookie = Some(value.trim().to_string()),
            "content-length" => content_length = value.trim().parse().unwrap_or(0),
            _ => {}
        }
    }

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    Some(Recorded {
        method,
        path,
        cookie,
        body,
    })
}

fn client(base_url: String) -> PortalClient {
    let config = PortalConfig {
        base_url,
        apply_password: "s3cret".to_string(),
        request_timeout: Duration::from_secs(5),
    };
    PortalClient::new(config).unwrap()
}

fn credential() -> SessionCredential {
    SessionCredential::aspxauth("cookie-value")
}

#[tokio::test]
async fn lists_postings_with_the_session_cookie() {
    let (base, log) = serve(|_| {
        (
            200,
            "Content-Type: application/json\r\n",
            r#"{"ListePostesAffichees":[{"GuidString":"g-1","Titpost":"Stage Rust","Extra":1}]}"#
                .to_string(),
        )
    })
    .await;

    let outcome = client(base).fetch_postings(&credential()).await.unwrap();

    assert_eq!(
        outcome,
        FetchOutcome::Postings(vec![Posting::new("g-1", "Stage Rust")])
    );
    let requests = log.lock().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/Postes/Rechercher");
    assert_eq!(requests[0].cookie.as_deref(), Some(".ASPXAUTH=cookie-value"));
}

#[tokio::test]
async fn login_redirect_is_a_rejection_and_is_not_followed() {
    let (base, log) = serve(|_| {
        (
            302,
            "Location: /Account/Login\r\n",
            String::new(),
        )
    })
    .await;

    let outcome = client(base).fetch_postings(&credential()).await.unwrap();

    assert_eq!(outcome, FetchOutcome::Rejected(reqwest::StatusCode::FOUND));
    assert_eq!(log.lock().len(), 1);
}

#[tokio::test]
async fn extracts_the_posting_description() {
    let (base, log) = serve(|_| {
        (
            200,
            "Content-Type: text/html\r\n",
            r#"<html><body><div id="etsMCContent"><h2>Mandat</h2><p>Build  tools </p></div></body></html>"#
                .to_string(),
        )
    })
    .await;

    let description = client(base)
        .fetch_description(&credential(), "g-1")
        .await
        .unwrap();

    assert_eq!(description, "Mandat\nBuild  tools");
    assert_eq!(log.lock()[0].path, "/Poste/g-1");
}

#[tokio::test]
async fn apply_posts_the_form_and_maps_forbidden() {
    let (base, log) = serve(|_| (403, "", String::new())).await;

    let response = client(base).apply(&credential(), "g-1").await.unwrap();

    assert_eq!(response, ApplyResponse::AlreadyApplied);
    let request = log.lock()[0].clone();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/Postulation/Postuler");
    assert!(request.body.contains("Postulant.Poste.Guid=g-1"));
    assert!(request.body.contains("password=s3cret"));
}
