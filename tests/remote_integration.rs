//! Purpose: End-to-end tests for the HTTP/JSON book service and its client.
//! Exports: None (integration test module).
//! Role: Validate list/create/update/delete and error propagation across TCP.
//! Invariants: Uses loopback-only servers with memory or temp-dir stores.
//! Invariants: Bounded waits avoid test flakiness.
//! Invariants: Server processes are cleaned up on drop.

use book_inventory::api::{BookFields, BookKey, ErrorKind, RemoteClient};
use serde_json::{Value, json};
use std::io::Read;
use std::net::{SocketAddr, TcpListener};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::thread::sleep;
use std::time::{Duration, Instant};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

static SERVER_LOCK: Mutex<()> = Mutex::new(());

struct TestServer {
    child: Child,
    base_url: String,
    _server_guard: MutexGuard<'static, ()>,
}

impl TestServer {
    fn start(store_uri: &str) -> TestResult<Self> {
        let guard = SERVER_LOCK
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let mut last_err: Option<Box<dyn std::error::Error>> = None;
        for _attempt in 0..3 {
            let port = pick_port()?;
            let bind = format!("127.0.0.1:{port}");
            let base_url = format!("http://{bind}");

            let mut child = Command::new(env!("CARGO_BIN_EXE_books"))
                .arg("serve")
                .arg("--port")
                .arg(port.to_string())
                .env("BOOKS_STORE_URI", store_uri)
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .spawn()?;

            match wait_for_server(&mut child, bind.parse()?) {
                Ok(()) => {
                    return Ok(Self {
                        child,
                        base_url,
                        _server_guard: guard,
                    });
                }
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    last_err = Some(err);
                    sleep(Duration::from_millis(30));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| "server failed to start".into()))
    }

    fn client(&self) -> TestResult<RemoteClient> {
        Ok(RemoteClient::new(self.base_url.clone())?)
    }

    fn books_url(&self) -> String {
        format!("{}/api/books", self.base_url)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn dune() -> BookFields {
    BookFields::new("Dune", "Herbert", "1965")
}

/// Returns the status and JSON body whether or not the status is an error.
fn read_raw(result: Result<ureq::Response, ureq::Error>) -> TestResult<(u16, Value)> {
    match result {
        Ok(resp) => {
            let status = resp.status();
            Ok((status, resp.into_json()?))
        }
        Err(ureq::Error::Status(status, resp)) => Ok((status, resp.into_json()?)),
        Err(err) => Err(err.into()),
    }
}

#[test]
fn create_update_delete_round_trip() -> TestResult<()> {
    let server = TestServer::start("memory:")?;
    let client = server.client()?;
    client.health()?;

    let created = client.create_book(&dune())?;
    assert_eq!(created.title, "Dune");
    assert_eq!(created.author, "Herbert");
    assert_eq!(created.year, 1965);

    let listed = client.list_books()?;
    assert_eq!(listed, vec![created.clone()]);

    let updated = client.update_book(
        &created.key,
        &BookFields::new("Dune", "Herbert", "1966"),
    )?;
    assert_eq!(updated.key, created.key);
    assert_eq!(updated.year, 1966);
    assert_eq!(client.list_books()?[0].year, 1966);

    let deleted = client.delete_book(&created.key)?;
    assert_eq!(deleted.key, created.key);
    assert_eq!(deleted.year, 1966);
    assert!(client.list_books()?.is_empty());

    let err = client
        .delete_book(&created.key)
        .expect_err("second delete");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.key(), Some(created.key.to_string().as_str()));
    Ok(())
}

#[test]
fn each_create_adds_exactly_one_record() -> TestResult<()> {
    let server = TestServer::start("memory:")?;
    let client = server.client()?;

    let first = client.create_book(&dune())?;
    let second = client.create_book(&dune())?;
    assert_ne!(first.key, second.key);

    let listed = client.list_books()?;
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|book| book.title == "Dune"));
    Ok(())
}

#[test]
fn list_uses_id_field_and_integer_year() -> TestResult<()> {
    let server = TestServer::start("memory:")?;
    let client = server.client()?;
    client.create_book(&dune())?;

    let (status, body) = read_raw(ureq::get(&server.books_url()).call())?;
    assert_eq!(status, 200);
    let record = &body.as_array().ok_or("expected array")?[0];
    let id = record["_id"].as_str().ok_or("expected _id string")?;
    assert_eq!(id.len(), 24);
    BookKey::parse(id)?;
    assert_eq!(record["year"], 1965);
    Ok(())
}

#[test]
fn invalid_create_is_rejected_and_list_unchanged() -> TestResult<()> {
    let server = TestServer::start("memory:")?;
    let client = server.client()?;
    client.create_book(&dune())?;

    let bad_bodies = [
        json!({ "title": "Dune", "author": "Herbert" }),
        json!({ "title": "", "author": "Herbert", "year": 1965 }),
        json!({ "title": "Dune", "author": "Herbert", "year": "soon" }),
        json!({ "title": "Dune", "author": "Herbert", "year": -3 }),
        json!({ "title": 7, "author": "Herbert", "year": 1965 }),
        json!({ "title": "Dune", "author": "Herbert", "year": null }),
    ];
    for body in bad_bodies {
        let (status, envelope) = read_raw(ureq::post(&server.books_url()).send_json(body))?;
        assert_eq!(status, 400);
        assert_eq!(envelope["error"]["kind"], "Usage");
        assert!(envelope["error"]["message"].is_string());
    }

    let (status, envelope) = read_raw(
        ureq::post(&server.books_url())
            .set("Content-Type", "application/json")
            .send_string("{not json"),
    )?;
    assert_eq!(status, 400);
    assert_eq!(envelope["error"]["kind"], "Usage");

    assert_eq!(client.list_books()?.len(), 1);
    Ok(())
}

#[test]
fn update_accepts_partial_body() -> TestResult<()> {
    let server = TestServer::start("memory:")?;
    let client = server.client()?;
    let created = client.create_book(&dune())?;

    let url = format!("{}/{}", server.books_url(), created.key);
    let (status, body) = read_raw(ureq::put(&url).send_json(json!({ "year": 1966 })))?;
    assert_eq!(status, 200);
    assert_eq!(body["title"], "Dune");
    assert_eq!(body["author"], "Herbert");
    assert_eq!(body["year"], 1966);
    assert_eq!(body["_id"], created.key.to_string());
    Ok(())
}

#[test]
fn invalid_update_bodies_are_rejected() -> TestResult<()> {
    let server = TestServer::start("memory:")?;
    let client = server.client()?;
    let created = client.create_book(&dune())?;
    let url = format!("{}/{}", server.books_url(), created.key);

    let (status, envelope) =
        read_raw(ureq::put(&url).send_json(json!({ "title": null, "year": null })))?;
    assert_eq!(status, 400);
    assert_eq!(envelope["error"]["kind"], "Usage");

    let (status, envelope) = read_raw(
        ureq::put(&url)
            .set("Content-Type", "application/json")
            .send_string("{not json"),
    )?;
    assert_eq!(status, 400);
    assert_eq!(envelope["error"]["kind"], "Usage");

    let (status, envelope) = read_raw(
        ureq::put(&url)
            .set("Content-Type", "text/plain")
            .send_string(r#"{"year": 1966}"#),
    )?;
    assert_eq!(status, 400);
    assert_eq!(envelope["error"]["kind"], "Usage");
    assert!(envelope["error"]["hint"]
        .as_str()
        .ok_or("expected hint")?
        .contains("Content-Type"));

    assert_eq!(client.list_books()?, vec![created]);
    Ok(())
}

#[test]
fn unknown_and_malformed_keys() -> TestResult<()> {
    let server = TestServer::start("memory:")?;
    let client = server.client()?;
    client.create_book(&dune())?;

    let missing = BookKey::generate()?;
    let err = client
        .update_book(&missing, &dune())
        .expect_err("update missing");
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let url = format!("{}/not-a-key", server.books_url());
    let (status, envelope) = read_raw(ureq::delete(&url).call())?;
    assert_eq!(status, 400);
    assert_eq!(envelope["error"]["kind"], "Usage");
    assert_eq!(envelope["error"]["key"], "not-a-key");

    assert_eq!(client.list_books()?.len(), 1);
    Ok(())
}

#[test]
fn cors_allows_any_origin_by_default() -> TestResult<()> {
    let server = TestServer::start("memory:")?;
    let resp = ureq::get(&server.books_url())
        .set("Origin", "http://example.test")
        .call()?;
    assert_eq!(resp.header("access-control-allow-origin"), Some("*"));
    Ok(())
}

#[test]
fn file_store_survives_restart() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    let uri = temp_dir.path().to_string_lossy().to_string();

    let created = {
        let server = TestServer::start(&uri)?;
        server.client()?.create_book(&dune())?
    };

    let server = TestServer::start(&uri)?;
    let listed = server.client()?.list_books()?;
    assert_eq!(listed, vec![created]);
    Ok(())
}

#[test]
fn unreachable_server_is_io_error() -> TestResult<()> {
    let port = pick_port()?;
    let client = RemoteClient::new(format!("http://127.0.0.1:{port}"))?;
    let err = client.list_books().expect_err("nothing listening");
    assert_eq!(err.kind(), ErrorKind::Io);
    Ok(())
}

fn pick_port() -> TestResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

fn wait_for_server(child: &mut Child, addr: SocketAddr) -> TestResult<()> {
    let url = format!("http://{addr}/healthz");
    let start = Instant::now();
    loop {
        if let Ok(resp) = ureq::get(&url).call() {
            if resp.status() == 200 {
                return Ok(());
            }
        }
        if let Some(status) = child.try_wait()? {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            let detail = stderr.trim();
            return Err(format!(
                "server exited before ready (status: {status}, stderr: {})",
                if detail.is_empty() { "<empty>" } else { detail }
            )
            .into());
        }
        if start.elapsed() > Duration::from_secs(8) {
            return Err("server did not start in time".into());
        }
        sleep(Duration::from_millis(20));
    }
}
