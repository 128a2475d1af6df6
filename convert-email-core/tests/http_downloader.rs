use convert_email_core::contract::Downloader;
use convert_email_core::download::HttpDownloader;
use convert_email_core::error::FetchError;
use reqwest::Client;
use std::fs;
use std::io::{Cursor, Write};
use std::net::SocketAddr;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Serve a single canned HTTP response on a local port.
async fn serve_once(response: Vec<u8>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
            if request.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
        socket.write_all(&response).await.unwrap();
        socket.shutdown().await.ok();
    });
    addr
}

fn http_response(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut response = format!("HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n", body.len());
    for (name, value) in headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str("\r\n");
    let mut bytes = response.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

fn downloader() -> HttpDownloader {
    HttpDownloader::with_client(Client::builder().no_proxy().build().unwrap())
}

#[tokio::test]
async fn test_error_status_is_a_transport_failure() {
    let addr = serve_once(http_response("404 Not Found", &[], b"")).await;
    let tmp = tempdir().unwrap();
    let url = format!("http://{addr}/private/mail.eml");

    let err = downloader().fetch(&url, tmp.path()).await.unwrap_err();

    match err {
        FetchError::Transport { url: failed_url, message } => {
            assert_eq!(failed_url, url);
            assert!(message.contains("404"), "unexpected message: {message}");
        }
        other => panic!("expected transport error, got {other:?}"),
    }
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_unreachable_host_is_a_transport_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let tmp = tempdir().unwrap();

    let err = downloader()
        .fetch(&format!("http://{addr}/mail.eml"), tmp.path())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Transport { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_single_file_is_named_from_the_url_path() {
    let addr = serve_once(http_response("200 OK", &[], b"Subject: hello")).await;
    let tmp = tempdir().unwrap();

    downloader()
        .fetch(&format!("http://{addr}/shared/re%20hello.eml"), tmp.path())
        .await
        .unwrap();

    assert_eq!(
        fs::read_to_string(tmp.path().join("re hello.eml")).unwrap(),
        "Subject: hello"
    );
}

#[tokio::test]
async fn test_zip_body_is_extracted_into_destination() {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("inbox/first.eml", SimpleFileOptions::default()).unwrap();
    zip.write_all(b"Subject: one").unwrap();
    zip.start_file("inbox/second.msg", SimpleFileOptions::default()).unwrap();
    zip.write_all(b"binary-ish").unwrap();
    let body = zip.finish().unwrap().into_inner();

    let addr = serve_once(http_response(
        "200 OK",
        &[
            ("Content-Type", "application/zip"),
            ("Content-Disposition", r#"attachment; filename="inbox.zip""#),
        ],
        &body,
    ))
    .await;
    let tmp = tempdir().unwrap();

    downloader()
        .fetch(&format!("http://{addr}/download"), tmp.path())
        .await
        .unwrap();

    assert_eq!(
        fs::read_to_string(tmp.path().join("inbox").join("first.eml")).unwrap(),
        "Subject: one"
    );
    assert!(tmp.path().join("inbox").join("second.msg").is_file());
    assert!(!tmp.path().join("inbox.zip").exists());
}
