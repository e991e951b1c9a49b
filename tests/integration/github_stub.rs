//! Minimal GitHub issues API on a local port.
//!
//! Serves `GET /repos/{owner}/{repo}/issues` (open issues only) and
//! `GET /repos/{owner}/{repo}/issues/{n}`. One request per connection.

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub struct GithubStub {
    pub base_url: String,
    issues: Arc<Mutex<Vec<Value>>>,
}

impl GithubStub {
    pub async fn start(issues: Vec<Value>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let issues = Arc::new(Mutex::new(issues));

        let shared = issues.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let shared = shared.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let mut read = 0;
                    while read < buf.len() {
                        let n = socket.read(&mut buf[read..]).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        read += n;
                        if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    let request = String::from_utf8_lossy(&buf[..read]).to_string();
                    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let (status, body) = route(&path, &shared);
                    let response = format!(
                        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { base_url: format!("http://{addr}"), issues }
    }

    pub fn issue(number: u64, title: &str) -> Value {
        json!({
            "number": number,
            "title": title,
            "state": "open",
            "closed_at": null,
            "updated_at": "2024-05-01T00:00:00Z"
        })
    }

    pub fn close_issue(&self, number: u64) {
        let mut issues = self.issues.lock().unwrap();
        if let Some(issue) = issues.iter_mut().find(|i| i["number"] == number) {
            issue["state"] = json!("closed");
            issue["closed_at"] = json!("2024-05-02T00:00:00Z");
        }
    }
}

fn route(path: &str, issues: &Mutex<Vec<Value>>) -> (&'static str, String) {
    let issues = issues.lock().unwrap();
    let path = path.split('?').next().unwrap_or(path);

    if path.ends_with("/issues") {
        let open: Vec<&Value> = issues.iter().filter(|i| i["state"] == "open").collect();
        return ("200 OK", serde_json::to_string(&open).unwrap());
    }

    let number = path.rsplit('/').next().and_then(|n| n.parse::<u64>().ok());
    match number.and_then(|n| issues.iter().find(|i| i["number"] == n)) {
        Some(issue) => ("200 OK", issue.to_string()),
        None => ("404 Not Found", json!({"message": "Not Found"}).to_string()),
    }
}
