use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use courier::config::{Chunking, Config};
use courier::http::connection::Connection;
use courier::http::request::Request;
use courier::http::response::{Response, ResponseBuilder, StatusCode};
use courier::http::service::{Hello, Reply, Service};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

fn config() -> Config {
    Config {
        server_name: None,
        idle_timeout_secs: 5,
        ..Config::default()
    }
}

fn serve(cfg: Config, service: Arc<dyn Service>) -> (DuplexStream, JoinHandle<anyhow::Result<()>>) {
    let (client, server) = duplex(64 * 1024);
    let task = tokio::spawn(async move { Connection::new(server, &cfg, service).run().await });
    (client, task)
}

async fn exchange(cfg: Config, service: Arc<dyn Service>, raw: &str) -> String {
    let (mut client, task) = serve(cfg, service);
    client.write_all(raw.as_bytes()).await.unwrap();

    let mut wire = String::new();
    client.read_to_string(&mut wire).await.unwrap();
    let _ = task.await.unwrap();
    wire
}

fn body_of(wire: &str) -> &str {
    let end = wire.find("\r\n\r\n").expect("no header terminator") + 4;
    &wire[end..]
}

#[tokio::test]
async fn test_full_body_is_sent_with_length() {
    let wire = exchange(
        config(),
        Arc::new(Hello),
        "GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(wire.contains("Content-Length: 19\r\n"));
    assert!(wire.contains("Connection: close\r\n"));
    assert_eq!(body_of(&wire), "Hello from courier\n");
}

#[tokio::test]
async fn test_streamed_body_uses_chunked_encoding() {
    let wire = exchange(
        config(),
        Arc::new(Hello),
        "GET /stream HTTP/1.1\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(wire.contains("Transfer-Encoding: chunked\r\n"));
    assert!(!wire.contains("Content-Length"));
    assert_eq!(
        body_of(&wire),
        "a\r\nstreaming \r\n5\r\nfrom \r\n8\r\ncourier\n\r\n0\r\n\r\n"
    );
}

#[tokio::test]
async fn test_stream_consolidated_when_chunking_disabled() {
    let cfg = Config {
        chunking: Chunking::Never,
        ..config()
    };
    let wire = exchange(cfg, Arc::new(Hello), "GET /stream HTTP/1.1\r\nConnection: close\r\n\r\n").await;

    assert!(wire.contains("Content-Length: 23\r\n"));
    assert!(!wire.contains("Transfer-Encoding"));
    assert_eq!(body_of(&wire), "streaming from courier\n");
}

#[tokio::test]
async fn test_http10_stream_is_consolidated() {
    let wire = exchange(config(), Arc::new(Hello), "GET /stream HTTP/1.0\r\n\r\n").await;

    assert!(wire.starts_with("HTTP/1.0 200 OK\r\n"));
    assert!(wire.contains("Content-Length: 23\r\n"));
    assert!(wire.contains("Connection: close\r\n"));
    assert_eq!(body_of(&wire), "streaming from courier\n");
}

#[tokio::test]
async fn test_head_request_gets_headers_only() {
    let wire = exchange(config(), Arc::new(Hello), "HEAD / HTTP/1.1\r\nConnection: close\r\n\r\n").await;

    assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(wire.contains("Content-Length: 19\r\n"));
    assert_eq!(body_of(&wire), "");
}

#[tokio::test]
async fn test_head_request_streamed_has_no_chunks() {
    let wire = exchange(
        config(),
        Arc::new(Hello),
        "HEAD /stream HTTP/1.1\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(wire.contains("Transfer-Encoding: chunked\r\n"));
    assert_eq!(body_of(&wire), "");
}

#[tokio::test]
async fn test_keep_alive_serves_pipelined_requests() {
    let wire = exchange(
        config(),
        Arc::new(Hello),
        "GET / HTTP/1.1\r\n\r\nGET /missing HTTP/1.1\r\nConnection: close\r\n\r\n",
    )
    .await;

    let first = wire.find("HTTP/1.1 200 OK").unwrap();
    let second = wire.find("HTTP/1.1 404 Not Found").unwrap();
    assert!(first < second);
    assert!(wire.ends_with("404 Not Found"));
}

#[tokio::test]
async fn test_application_can_close_connection() {
    let service = |_req: &Request| {
        let mut response = Response::new(StatusCode::Ok);
        response.set_header("Connection", "close");
        Reply::full(response, "bye")
    };
    // The second request is never answered.
    let wire = exchange(
        config(),
        Arc::new(service),
        "GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n",
    )
    .await;

    assert_eq!(wire.matches("HTTP/1.1 200 OK").count(), 1);
    assert!(wire.ends_with("\r\n\r\nbye"));
}

#[tokio::test]
async fn test_buffer_limit_switches_to_chunked() {
    let service = |_req: &Request| {
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            for part in ["0123456789", "abcdefghij"] {
                let _ = tx.send(Bytes::from_static(part.as_bytes())).await;
            }
        });
        let response = ResponseBuilder::new(StatusCode::Ok).content_length(20).build();
        Reply::stream(response, rx)
    };
    let cfg = Config {
        max_buffered_bytes: 16,
        ..config()
    };
    let wire = exchange(cfg, Arc::new(service), "GET / HTTP/1.1\r\nConnection: close\r\n\r\n").await;

    assert!(wire.contains("Transfer-Encoding: chunked\r\n"));
    assert_eq!(body_of(&wire), "a\r\n0123456789\r\na\r\nabcdefghij\r\n0\r\n\r\n");
}

#[tokio::test]
async fn test_malformed_request_is_rejected() {
    let (mut client, task) = serve(config(), Arc::new(Hello));
    client.write_all(b"NONSENSE\r\n\r\n").await.unwrap();

    let mut wire = String::new();
    client.read_to_string(&mut wire).await.unwrap();

    assert!(wire.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(wire.contains("Connection: close\r\n"));
    assert!(task.await.unwrap().is_err());
}

#[tokio::test]
async fn test_chunked_request_body_is_not_implemented() {
    let (mut client, task) = serve(config(), Arc::new(Hello));
    client
        .write_all(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n")
        .await
        .unwrap();

    let mut wire = String::new();
    client.read_to_string(&mut wire).await.unwrap();

    assert!(wire.starts_with("HTTP/1.1 501 Not Implemented\r\n"));
    assert!(task.await.unwrap().is_err());
}

#[tokio::test]
async fn test_client_hangup_ends_connection() {
    let (client, task) = serve(config(), Arc::new(Hello));
    drop(client);

    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_idle_connection_is_closed() {
    let cfg = Config {
        idle_timeout_secs: 1,
        ..config()
    };
    let (mut client, task) = serve(cfg, Arc::new(Hello));

    let mut wire = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut wire))
        .await
        .expect("connection was not closed")
        .unwrap();

    assert!(wire.is_empty());
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_buffer_limit_ignored_when_chunking_disabled() {
    let service = |_req: &Request| {
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            for _ in 0..2 {
                let _ = tx.send(Bytes::from(vec![b'q'; 32])).await;
            }
        });
        Reply::stream(Response::new(StatusCode::Ok), rx)
    };
    let cfg = Config {
        chunking: Chunking::Never,
        max_buffered_bytes: 16,
        ..config()
    };
    let wire = exchange(cfg, Arc::new(service), "GET / HTTP/1.1\r\nConnection: close\r\n\r\n").await;

    assert!(wire.contains("Content-Length: 64\r\n"));
    assert!(!wire.contains("Transfer-Encoding"));
    assert_eq!(body_of(&wire), "q".repeat(64));
}

#[tokio::test]
async fn test_slow_reader_receives_whole_response() {
    let service = |_req: &Request| Reply::ok(vec![b'b'; 16_000]);
    let cfg = Config {
        idle_timeout_secs: 1,
        ..config()
    };
    let (client, server) = duplex(1024);
    let task = tokio::spawn(async move { Connection::new(server, &cfg, Arc::new(service)).run().await });
    let mut client = client;
    client
        .write_all(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    // Draining takes well over the idle timeout, but the writer keeps moving.
    let mut wire = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let n = client.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        wire.extend_from_slice(&buf[..n]);
    }

    let wire = String::from_utf8(wire).unwrap();
    assert!(wire.contains("Content-Length: 16000\r\n"));
    assert_eq!(body_of(&wire).len(), 16_000);
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_stalled_stream_is_closed_on_idle() {
    let service = |_req: &Request| {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let _ = tx.send(Bytes::from_static(b"hi")).await;
            // Hold the sender open without producing anything else.
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(tx);
        });
        Reply::stream(Response::new(StatusCode::Ok), rx)
    };
    let cfg = Config {
        idle_timeout_secs: 1,
        ..config()
    };
    let (mut client, task) = serve(cfg, Arc::new(service));
    client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

    let mut wire = String::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_string(&mut wire))
        .await
        .expect("connection was not closed")
        .unwrap();

    assert!(wire.contains("Transfer-Encoding: chunked\r\n"));
    assert_eq!(body_of(&wire), "2\r\nhi\r\n");
    assert!(!wire.contains("0\r\n\r\n"));
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_zero_idle_timeout_disables_timer() {
    let cfg = Config {
        idle_timeout_secs: 0,
        ..config()
    };
    let wire = exchange(cfg, Arc::new(Hello), "GET / HTTP/1.1\r\nConnection: close\r\n\r\n").await;

    assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body_of(&wire), "Hello from courier\n");
}
