use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use anyhow::Result;
use bgcat_core::{
    Boardgame, CatalogClient, CatalogConfig, CatalogError, Category, Operation, StatusPolicy,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

#[derive(Debug, Clone)]
struct RecordedRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl RecordedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("request body should be JSON")
    }
}

/// Catalog stand-in answering every request with the same status and body.
struct MockCatalog {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl MockCatalog {
    async fn start(status: u16, body: impl Into<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock catalog");
        let addr = listener.local_addr().expect("mock catalog addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let body = Arc::new(body.into());

        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let recorded = Arc::clone(&recorded);
                let body = Arc::clone(&body);
                tokio::spawn(async move {
                    let Some(request) = read_request(&mut stream).await else {
                        return;
                    };
                    recorded.lock().push(request);
                    let head = format!(
                        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        status,
                        status_text(status),
                        body.len()
                    );
                    let _ = stream.write_all(head.as_bytes()).await;
                    let _ = stream.write_all(body.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self {
            addr,
            requests,
            handle,
        }
    }

    fn base_url(&self) -> String {
        format!("http://{}/api/boardgame", self.addr)
    }

    fn client(&self) -> CatalogClient {
        CatalogClient::new(&CatalogConfig::new(self.base_url())).expect("client should build")
    }

    fn client_with(&self, policy: StatusPolicy) -> CatalogClient {
        let config = CatalogConfig::new(self.base_url()).with_status_policy(policy);
        CatalogClient::new(&config).expect("client should build")
    }

    fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

impl Drop for MockCatalog {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|window| window == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    let body_len = headers
        .get("content-length")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + body_len {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Some(RecordedRequest {
        method,
        path,
        headers,
        body: buf[header_end..header_end + body_len].to_vec(),
    })
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

fn stored(name: &str, publisher: &str, players: i32, id: u64) -> Value {
    json!({
        "name": name,
        "publisher": publisher,
        "playerNumber": players,
        "tags": [{"name": "B"}],
        "boardgameID": id
    })
}

#[tokio::test]
async fn create_returns_record_with_assigned_id() -> Result<()> {
    let service = MockCatalog::start(200, stored("name", "pubs", 3, 42).to_string()).await;
    let game = Boardgame::new("name", "pubs", 3);

    let created = service.client().create(&game).await?;
    assert_eq!(created.boardgame_id, Some(42));
    assert_eq!(created.name, "name");
    assert_eq!(created.publisher, "pubs");

    let requests = service.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/api/boardgame");
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.json(), serde_json::to_value(&game)?);
    assert!(request.json().get("boardgameID").is_none());
    Ok(())
}

#[tokio::test]
async fn create_failure_is_a_status_error() {
    let service = MockCatalog::start(500, r#"{"Status":500,"Message":"database down"}"#).await;

    let err = service
        .client()
        .create(&Boardgame::new("name", "pubs", 3))
        .await
        .expect_err("500 must not parse as a record");
    match &err {
        CatalogError::Status {
            operation,
            status,
            message,
        } => {
            assert_eq!(*operation, Operation::Create);
            assert_eq!(*status, 500);
            assert!(message.contains("database down"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn create_checks_status_even_when_lenient() {
    let service = MockCatalog::start(400, stored("name", "pubs", 3, 1).to_string()).await;

    let err = service
        .client_with(StatusPolicy::Lenient)
        .create(&Boardgame::new("name", "pubs", 3))
        .await
        .expect_err("create always checks status");
    assert_eq!(err.status(), Some(400));
}

#[tokio::test]
async fn get_all_keeps_service_order() -> Result<()> {
    let body = json!([
        stored("Azul", "Next Move", 4, 1),
        stored("Brass", "Roxley", 4, 2),
        stored("Coup", "Indie Boards", 6, 3),
    ]);
    let service = MockCatalog::start(200, body.to_string()).await;

    let games = service.client().get_all().await?;
    let names: Vec<_> = games.iter().map(|game| game.name.as_str()).collect();
    assert_eq!(names, ["Azul", "Brass", "Coup"]);
    assert_eq!(
        games.iter().map(|game| game.boardgame_id).collect::<Vec<_>>(),
        [Some(1), Some(2), Some(3)]
    );

    let requests = service.requests();
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/api/boardgame");
    Ok(())
}

#[tokio::test]
async fn get_all_bypasses_caches() -> Result<()> {
    let service = MockCatalog::start(200, json!([stored("Azul", "Next Move", 4, 1)]).to_string()).await;
    let client = service.client();

    client.get_all().await?;
    client.get_all().await?;

    let requests = service.requests();
    assert_eq!(requests.len(), 2, "each call must reach the service");
    for request in &requests {
        let cache_control = request.header("cache-control").unwrap_or_default();
        assert!(cache_control.contains("no-cache"), "got {cache_control:?}");
        assert!(cache_control.contains("no-store"), "got {cache_control:?}");
        assert_eq!(request.header("pragma"), Some("no-cache"));
    }
    Ok(())
}

#[tokio::test]
async fn summaries_project_name_publisher_and_players() -> Result<()> {
    let body = json!([stored("Azul", "Next Move", 4, 1), stored("Coup", "Indie Boards", 6, 3)]);
    let service = MockCatalog::start(200, body.to_string()).await;

    let summaries = service.client().summaries().await?;
    let lines: Vec<_> = summaries.iter().map(ToString::to_string).collect();
    assert_eq!(
        lines,
        ["Azul · Next Move · 4 players", "Coup · Indie Boards · 6 players"]
    );
    Ok(())
}

#[tokio::test]
async fn delete_one_returns_the_deleted_record() -> Result<()> {
    let body = json!({
        "name": "Root",
        "publisher": "Leder",
        "playerNumber": 4,
        "tags": [{"name": "B"}],
        "categories": [{"name": "Wargame"}],
        "boardgameID": 1
    });
    let service = MockCatalog::start(200, body.to_string()).await;

    let deleted = service.client().delete_one().await?;
    let mut expected = Boardgame::new("Root", "Leder", 4);
    expected.categories.push(Category::new("Wargame"));
    expected.boardgame_id = Some(1);
    assert_eq!(deleted, Some(expected));

    let requests = service.requests();
    assert_eq!(requests[0].method, "DELETE");
    assert_eq!(requests[0].path, "/api/boardgame/1");
    assert_eq!(requests[0].header("content-type"), Some("application/json"));
    Ok(())
}

#[tokio::test]
async fn get_one_reads_the_fixed_record() -> Result<()> {
    let service = MockCatalog::start(200, stored("Azul", "Next Move", 4, 1).to_string()).await;

    let game = service.client().get_one().await?;
    assert_eq!(game.boardgame_id, Some(1));
    assert_eq!(service.requests()[0].path, "/api/boardgame/1");
    Ok(())
}

#[tokio::test]
async fn strict_policy_rejects_not_found() {
    let service = MockCatalog::start(404, stored("ghost", "none", 1, 1).to_string()).await;

    let err = service
        .client()
        .get_one()
        .await
        .expect_err("strict policy rejects 404");
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.operation(), Some(Operation::Get));
}

#[tokio::test]
async fn lenient_policy_parses_body_regardless_of_status() -> Result<()> {
    let service = MockCatalog::start(404, stored("ghost", "none", 1, 1).to_string()).await;

    let game = service
        .client_with(StatusPolicy::Lenient)
        .delete(1)
        .await?;
    assert_eq!(game.map(|game| game.name).as_deref(), Some("ghost"));
    Ok(())
}

#[tokio::test]
async fn delete_without_body_succeeds() -> Result<()> {
    let service = MockCatalog::start(204, "").await;

    let deleted = service.client().delete(7).await?;
    assert_eq!(deleted, None);

    let requests = service.requests();
    assert_eq!(requests[0].method, "DELETE");
    assert_eq!(requests[0].path, "/api/boardgame/7");
    Ok(())
}

#[tokio::test]
async fn failed_delete_without_body_is_a_status_error() {
    let service = MockCatalog::start(404, "").await;

    let err = service
        .client()
        .delete(7)
        .await
        .expect_err("404 is not a successful delete");
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.operation(), Some(Operation::Delete));
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let service = MockCatalog::start(200, r#"{"name": 5}"#).await;

    let err = service
        .client()
        .get(9)
        .await
        .expect_err("shape mismatch must be reported");
    assert!(matches!(
        err,
        CatalogError::Decode {
            operation: Operation::Get,
            ..
        }
    ));
    assert_eq!(service.requests()[0].path, "/api/boardgame/9");
}

#[tokio::test]
async fn update_patches_the_record() -> Result<()> {
    let service = MockCatalog::start(200, stored("Azul", "Plan B", 4, 5).to_string()).await;
    let game = Boardgame::new("Azul", "Plan B", 4);

    let updated = service.client().update(5, &game).await?;
    assert_eq!(updated.publisher, "Plan B");

    let requests = service.requests();
    let request = &requests[0];
    assert_eq!(request.method, "PATCH");
    assert_eq!(request.path, "/api/boardgame/5");
    assert_eq!(request.json()["publisher"], json!("Plan B"));
    Ok(())
}

#[tokio::test]
async fn create_expansion_posts_under_parent() -> Result<()> {
    let service = MockCatalog::start(201, stored("Azul: Joker", "Next Move", 4, 11).to_string()).await;

    let created = service
        .client()
        .create_expansion(10, &Boardgame::new("Azul: Joker", "Next Move", 4))
        .await?;
    assert_eq!(created.boardgame_id, Some(11));

    let requests = service.requests();
    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/api/boardgame/10/expansion");
    Ok(())
}

#[tokio::test]
async fn concurrent_creates_are_independent() -> Result<()> {
    let service = MockCatalog::start(200, stored("name", "pubs", 3, 42).to_string()).await;
    let client = service.client();
    let first = Boardgame::new("first", "pubs", 2);
    let second = Boardgame::new("second", "pubs", 3);
    let third = Boardgame::new("third", "pubs", 4);

    let (a, b, c) = tokio::join!(
        client.create(&first),
        client.create(&second),
        client.create(&third)
    );
    for result in [a, b, c] {
        assert_eq!(result?.boardgame_id, Some(42));
    }

    let mut names: Vec<_> = service
        .requests()
        .iter()
        .map(|request| request.json()["name"].as_str().unwrap_or_default().to_string())
        .collect();
    names.sort();
    assert_eq!(names, ["first", "second", "third"]);
    Ok(())
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let client = CatalogClient::new(&CatalogConfig::new(format!("http://{addr}/api/boardgame")))?;
    let err = client.get_all().await.expect_err("nothing is listening");
    assert!(matches!(
        err,
        CatalogError::Transport {
            operation: Operation::List,
            ..
        }
    ));
    assert_eq!(err.kind(), "transport");
    assert_eq!(err.status(), None);
    Ok(())
}

#[test]
fn invalid_base_url_is_rejected_at_construction() {
    let err = CatalogClient::new(&CatalogConfig::new("not a url")).expect_err("invalid url");
    assert!(matches!(err, CatalogError::InvalidBaseUrl { .. }));

    let err = CatalogClient::new(&CatalogConfig::new("http://catalog/api/boardgame?x=1"))
        .expect_err("query would end up in front of record ids");
    assert!(matches!(err, CatalogError::InvalidBaseUrl { .. }));
}
