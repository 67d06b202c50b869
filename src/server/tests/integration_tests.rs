// Copyright 2025 Ticksync Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! End-to-end coordination tests: real TCP, real clients, a memory sink.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use ticksync_client::Client;
use ticksync_common::catalog::StateSchema;
use ticksync_common::config::CoordinationConfig;
use ticksync_common::snapshot::Snapshot;
use ticksync_connector::sink::memory::MemorySink;
use ticksync_connector::SinkImpl;
use ticksync_server::{serve, ServerConfig, ServerResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct TestServer {
    addr: SocketAddr,
    records: Arc<Mutex<Vec<Snapshot>>>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<ServerResult<()>>,
    dir: tempfile::TempDir,
}

impl TestServer {
    async fn start(base_port: u16, columns: &[&str]) -> Self {
        let schema = StateSchema::new(columns.iter().copied()).unwrap();
        let sink = MemorySink::new(schema);
        let records = sink.records();
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            ip: "127.0.0.1".to_owned(),
            port: base_port,
            coordination: CoordinationConfig {
                wait_tick: Duration::from_micros(50),
                commit_interval: Duration::from_millis(100),
                read_timeout: Duration::from_secs(5),
                port_file: Some(dir.path().join("port.txt")),
            },
        };
        let (addr, handle, shutdown) = serve(config, SinkImpl::Memory(sink)).await.unwrap();
        Self {
            addr,
            records,
            shutdown,
            handle,
            dir,
        }
    }

    fn client(&self) -> Client {
        Client::new("127.0.0.1", self.addr.port())
    }

    async fn wait_for_records(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.records.lock().len() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "expected {n} sink records, got {}",
                self.records.lock().len()
            )
        });
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        // A requested shutdown is the clean path.
        self.handle.await.unwrap().unwrap();
    }
}

fn data(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
    pairs.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect()
}

fn request(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| (*n).to_owned()).collect()
}

#[tokio::test]
async fn single_client_full_step() {
    let server = TestServer::start(0, &["a", "b", "c"]).await;
    let client = server.client();

    let reply = client
        .exchange(
            data(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]),
            request(&["a", "b", "c"]),
        )
        .await
        .unwrap();
    assert_eq!(reply.time, 1);
    assert_eq!(reply.values["a"], 1.0);
    assert_eq!(reply.values["b"], 2.0);
    assert_eq!(reply.values["c"], 3.0);

    server.wait_for_records(1).await;
    {
        let records = server.records.lock();
        let expected = Snapshot {
            time: 1,
            values: data(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]),
        };
        assert!(records[0].approx_eq(&expected));
        assert_eq!(records[0].time, 1);
    }

    // The next client starts a new step.
    let reply = client
        .exchange(
            data(&[("a", 4.0), ("b", 5.0), ("c", 6.0)]),
            request(&["a"]),
        )
        .await
        .unwrap();
    assert_eq!(reply.time, 2);

    server.stop().await;
}

#[tokio::test]
async fn two_clients_cover_schema() {
    let server = TestServer::start(0, &["a", "b"]).await;
    let client_a = server.client();
    let client_b = server.client();

    let (reply_a, reply_b) = tokio::join!(
        client_a.exchange(data(&[("a", 10.0)]), request(&["b"])),
        client_b.exchange(data(&[("b", 20.0)]), request(&["a"])),
    );
    let reply_a = reply_a.unwrap();
    let reply_b = reply_b.unwrap();

    assert_eq!(reply_a.time, 1);
    assert_eq!(reply_a.values.len(), 1);
    assert_eq!(reply_a.values["b"], 20.0);
    assert_eq!(reply_b.time, 1);
    assert_eq!(reply_b.values.len(), 1);
    assert_eq!(reply_b.values["a"], 10.0);

    server.wait_for_records(1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    {
        let records = server.records.lock();
        // One combined record, not one per client.
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].time, 1);
        assert_eq!(records[0].values, data(&[("a", 10.0), ("b", 20.0)]));
    }

    server.stop().await;
}

#[tokio::test]
async fn partial_step_never_replies() {
    let server = TestServer::start(0, &["a", "b"]).await;
    let client = server.client();

    // `b` is never assigned: the exit gate stays closed and the reply
    // must not arrive within the test window.
    let blocked = tokio::time::timeout(
        Duration::from_millis(300),
        client.exchange(data(&[("a", 5.0)]), request(&["a"])),
    )
    .await;
    assert!(blocked.is_err(), "reply must be gated until the step completes");
    assert!(server.records.lock().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn multi_step_pipeline() {
    let server = TestServer::start(0, &["a", "b"]).await;

    for round in 1..=3u64 {
        let client_a = server.client();
        let client_b = server.client();
        let value = round as f64;
        let (reply_a, reply_b) = tokio::join!(
            client_a.exchange(data(&[("a", value)]), request(&["b"])),
            client_b.exchange(data(&[("b", -value)]), request(&["a"])),
        );
        assert_eq!(reply_a.unwrap().time, round);
        assert_eq!(reply_b.unwrap().time, round);
        server.wait_for_records(round as usize).await;
    }

    let records = server.records.lock();
    assert_eq!(
        records.iter().map(|r| r.time).collect::<Vec<_>>(),
        vec![1, 2, 3],
    );
    for (record, round) in records.iter().zip(1..=3) {
        let value = round as f64;
        assert_eq!(record.values, data(&[("a", value), ("b", -value)]));
    }
    drop(records);

    server.stop().await;
}

#[tokio::test]
async fn empty_contribution_still_counts_and_releases() {
    let server = TestServer::start(0, &["a"]).await;
    let observer = server.client();
    let producer = server.client();

    let (observed, produced) = tokio::join!(
        observer.exchange(HashMap::new(), request(&["a"])),
        async {
            // Let the observer register first so it provably waits.
            tokio::time::sleep(Duration::from_millis(100)).await;
            producer.exchange(data(&[("a", 7.0)]), request(&[])).await
        },
    );
    let observed = observed.unwrap();
    assert_eq!(observed.time, 1);
    assert_eq!(observed.values["a"], 7.0);
    assert_eq!(produced.unwrap().time, 1);

    server.stop().await;
}

#[tokio::test]
async fn duplicate_key_is_last_write_wins() {
    let server = TestServer::start(0, &["a", "b"]).await;
    let first = server.client();
    let second = server.client();

    let (reply_first, reply_second) = tokio::join!(
        first.exchange(data(&[("a", 1.0)]), request(&["a"])),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            second
                .exchange(data(&[("a", 2.0), ("b", 3.0)]), request(&["a"]))
                .await
        },
    );

    // The later write to `a` wins; both replies read the committed step.
    assert_eq!(reply_first.unwrap().values["a"], 2.0);
    assert_eq!(reply_second.unwrap().values["a"], 2.0);

    server.wait_for_records(1).await;
    {
        let records = server.records.lock();
        assert_eq!(records[0].values, data(&[("a", 2.0), ("b", 3.0)]));
    }

    server.stop().await;
}

#[tokio::test]
async fn unknown_request_names_are_omitted() {
    let server = TestServer::start(0, &["a"]).await;
    let client = server.client();

    let reply = client
        .exchange(data(&[("a", 1.0)]), request(&["a", "zzz"]))
        .await
        .unwrap();
    assert_eq!(reply.values.len(), 1);
    assert_eq!(reply.values["a"], 1.0);

    server.stop().await;
}

/// Scenario: the frame terminator `ł` (0xC5 0x82) split between two TCP
/// writes, exercised against a live server with a raw socket.
#[tokio::test]
async fn sentinel_split_across_writes() {
    let server = TestServer::start(0, &["a"]).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let mut frame = br#"{"data": {"a": 1.0}, "request": ["a"]}"#.to_vec();
    frame.extend_from_slice("ł".as_bytes());
    let (head, tail) = frame.split_at(frame.len() - 1);
    assert_eq!(tail, [0x82]);

    stream.write_all(head).await.unwrap();
    stream.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    stream.write_all(tail).await.unwrap();
    stream.flush().await.unwrap();

    // The server acks the envelope...
    let mut ack = [0u8; 1];
    stream.read_exact(&mut ack).await.unwrap();
    assert_eq!(ack[0], 0x79);

    // ...and replies once the step is complete.
    let mut reply_raw = Vec::new();
    let mut chunk = [0u8; 64];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "server closed before the reply finished");
        reply_raw.extend_from_slice(&chunk[..n]);
        if reply_raw.ends_with("ł".as_bytes()) {
            break;
        }
    }
    reply_raw.truncate(reply_raw.len() - "ł".as_bytes().len());
    let reply: serde_json::Value = serde_json::from_slice(&reply_raw).unwrap();
    assert_eq!(reply["a"], 1.0);
    assert_eq!(reply["time"], 1);
    stream.write_all(&[0x79]).await.unwrap();

    server.stop().await;
}

#[tokio::test]
async fn taken_port_moves_to_the_next_free_one() {
    const BASE_PORT: u16 = 46911;

    let first = TestServer::start(BASE_PORT, &["a"]).await;
    let second = TestServer::start(BASE_PORT, &["a"]).await;

    // Other processes may hold ports in this range too, so only the
    // relative claim is stable: the second server walked past the first.
    assert!(first.addr.port() >= BASE_PORT);
    assert!(second.addr.port() > first.addr.port());

    // The handoff file carries the port that was actually bound.
    let published = std::fs::read_to_string(second.dir.path().join("port.txt")).unwrap();
    assert_eq!(published, format!("{}\n", second.addr.port()));

    second.stop().await;
    first.stop().await;
}
