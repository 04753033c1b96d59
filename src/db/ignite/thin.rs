use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::protocol::{self, HandshakeReply, ProtocolError, Reader, Reply, Writer};
use super::{ClientCache, ClientConfiguration, ClientFactory, IgniteClient};
use crate::models::Record;

/// Opens thin-client TCP sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThinClientFactory;

#[async_trait]
impl ClientFactory for ThinClientFactory {
    async fn start_client(&self, config: &ClientConfiguration) -> Result<Arc<dyn IgniteClient>> {
        let mut last_err = anyhow!("no addresses configured for the Ignite client");
        for address in &config.addresses {
            match Connection::open(address).await {
                Ok(conn) => {
                    info!("Connected to Ignite node {}", address);
                    return Ok(Arc::new(ThinClient {
                        conn: Arc::new(conn),
                    }));
                }
                Err(e) => {
                    warn!("Ignite node {} unreachable: {:#}", address, e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let len = reader.read_i32_le().await.context("reading frame length")?;
    if len < 0 {
        bail!(ProtocolError::NegativeLength(len));
    }
    let len = len as usize;
    if len > protocol::MAX_FRAME_LEN {
        bail!(ProtocolError::FrameTooLarge {
            len,
            max: protocol::MAX_FRAME_LEN,
        });
    }
    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .context("reading frame body")?;
    Ok(body)
}

/// Marks the connection broken unless the exchange it guards completes.
///
/// Dropping a request future between the write and the end of the read
/// leaves a reply (or part of one) on the socket, so the stream can no
/// longer be trusted.
struct ExchangeGuard<'a> {
    broken: &'a AtomicBool,
    done: bool,
}

impl Drop for ExchangeGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.broken.store(true, Ordering::Release);
        }
    }
}

struct Connection {
    address: String,
    stream: Mutex<TcpStream>,
    next_id: AtomicI64,
    broken: AtomicBool,
}

impl Connection {
    async fn open(address: &str) -> Result<Self> {
        let mut stream = TcpStream::connect(address)
            .await
            .with_context(|| format!("connecting to {}", address))?;
        stream.set_nodelay(true)?;

        stream.write_all(&protocol::handshake_request()).await?;
        let body = read_frame(&mut stream).await?;
        match protocol::parse_handshake_reply(&body)? {
            HandshakeReply::Accepted => {}
            HandshakeReply::Rejected {
                server_version: (major, minor, patch),
                message,
            } => bail!(
                "handshake rejected by {} (server protocol {}.{}.{}): {}",
                address,
                major,
                minor,
                patch,
                message
            ),
        }

        Ok(Self {
            address: address.to_string(),
            stream: Mutex::new(stream),
            next_id: AtomicI64::new(1),
            broken: AtomicBool::new(false),
        })
    }

    fn check_alive(&self) -> Result<()> {
        if self.broken.load(Ordering::Acquire) {
            bail!(
                "connection to {} lost: an earlier request did not complete",
                self.address
            );
        }
        Ok(())
    }

    /// One request/response exchange; returns the success payload.
    async fn request(&self, op: i16, payload: Vec<u8>) -> Result<Vec<u8>> {
        self.check_alive()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = protocol::request(op, id, &payload);
        let body = {
            let mut stream = self.stream.lock().await;
            // another request may have broken the stream while we waited
            self.check_alive()?;
            let mut guard = ExchangeGuard {
                broken: &self.broken,
                done: false,
            };
            stream.write_all(&frame).await?;
            let body = read_frame(&mut *stream).await?;
            guard.done = true;
            body
        };
        let reply = match protocol::parse_reply(&body, id) {
            Ok(reply) => reply,
            Err(e) => {
                self.broken.store(true, Ordering::Release);
                return Err(e.into());
            }
        };
        match reply {
            Reply::Success(r) => {
                let consumed = body.len() - r.remaining();
                Ok(body[consumed..].to_vec())
            }
            Reply::Failure { status, message } => {
                debug!("op {} on {} failed with status {}", op, self.address, status);
                Err(anyhow!("Ignite error (status {}): {}", status, message))
            }
        }
    }
}

struct ThinClient {
    conn: Arc<Connection>,
}

#[async_trait]
impl IgniteClient for ThinClient {
    async fn cache_names(&self) -> Result<Vec<String>> {
        let payload = self
            .conn
            .request(protocol::OP_CACHE_GET_NAMES, Vec::new())
            .await?;
        Ok(Reader::new(&payload).string_list()?)
    }

    async fn cache(&self, name: &str) -> Result<Option<Arc<dyn ClientCache>>> {
        let names = self.cache_names().await?;
        if !names.iter().any(|n| n == name) {
            return Ok(None);
        }
        Ok(Some(Arc::new(ThinCache {
            conn: self.conn.clone(),
            name: name.to_string(),
            id: protocol::cache_id(name),
        })))
    }
}

struct ThinCache {
    conn: Arc<Connection>,
    name: String,
    id: i32,
}

impl ThinCache {
    fn keyed(&self, key: &str) -> Writer {
        let mut w = Writer::new();
        w.cache_header(self.id).string(key);
        w
    }
}

#[async_trait]
impl ClientCache for ThinCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Record>> {
        let payload = self
            .conn
            .request(protocol::OP_CACHE_GET, self.keyed(key).into_inner())
            .await?;
        Reader::new(&payload)
            .record()
            .with_context(|| format!("decoding value of {} in {}", key, self.name))
    }

    async fn put(&self, key: &str, value: &Record) -> Result<()> {
        let mut w = self.keyed(key);
        w.record(value);
        self.conn
            .request(protocol::OP_CACHE_PUT, w.into_inner())
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let payload = self
            .conn
            .request(protocol::OP_CACHE_REMOVE_KEY, self.keyed(key).into_inner())
            .await?;
        Ok(Reader::new(&payload).bool()?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use tokio::net::{TcpListener, TcpStream};

    use super::*;
    use crate::db::ignite::protocol::STATUS_SUCCESS;

    fn reply(id: i64, payload: &[u8]) -> Vec<u8> {
        let mut w = Writer::new();
        w.i64(id).i32(STATUS_SUCCESS);
        let mut body = w.into_inner();
        body.extend_from_slice(payload);
        let mut out = (body.len() as i32).to_le_bytes().to_vec();
        out.extend_from_slice(&body);
        out
    }

    /// Serves one connection: accepts the handshake, then answers requests
    /// against a single in-memory cache until the client hangs up. The first
    /// reply is held back for `first_delay`.
    async fn serve(mut socket: TcpStream, caches: Vec<&'static str>, first_delay: Duration) {
        let hello = read_frame(&mut socket).await.unwrap();
        assert_eq!(hello[0], protocol::OP_HANDSHAKE);
        socket.write_all(&[1, 0, 0, 0, 1]).await.unwrap();

        let mut store: HashMap<String, Vec<u8>> = HashMap::new();
        let mut delay = first_delay;
        while let Ok(body) = read_frame(&mut socket).await {
            let mut r = Reader::new(&body);
            let op = r.i16().unwrap();
            let id = r.i64().unwrap();
            let payload = match op {
                protocol::OP_CACHE_GET_NAMES => {
                    let mut w = Writer::new();
                    w.i32(caches.len() as i32);
                    for name in &caches {
                        w.string(name);
                    }
                    w.into_inner()
                }
                _ => {
                    assert_eq!(r.i32().unwrap(), protocol::cache_id("usertable"));
                    assert_eq!(r.u8().unwrap(), 0);
                    let key = r.string().unwrap().unwrap();
                    let rest = body[body.len() - r.remaining()..].to_vec();
                    match op {
                        protocol::OP_CACHE_GET => {
                            store.get(&key).cloned().unwrap_or(vec![protocol::TYPE_NULL])
                        }
                        protocol::OP_CACHE_PUT => {
                            store.insert(key, rest);
                            Vec::new()
                        }
                        protocol::OP_CACHE_REMOVE_KEY => {
                            vec![store.remove(&key).is_some() as u8]
                        }
                        other => panic!("unexpected op {}", other),
                    }
                }
            };
            if !delay.is_zero() {
                tokio::time::sleep(std::mem::take(&mut delay)).await;
            }
            if socket.write_all(&reply(id, &payload)).await.is_err() {
                break;
            }
        }
    }

    async fn spawn_server(caches: Vec<&'static str>) -> String {
        spawn_server_with_delay(caches, Duration::ZERO).await
    }

    async fn spawn_server_with_delay(caches: Vec<&'static str>, first_delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            serve(socket, caches, first_delay).await;
        });
        address
    }

    #[tokio::test]
    async fn round_trips_against_a_node() {
        let address = spawn_server(vec!["usertable"]).await;
        let config = ClientConfiguration::new().set_addresses([address]);
        let client = ThinClientFactory.start_client(&config).await.unwrap();

        assert_eq!(client.cache_names().await.unwrap(), vec!["usertable"]);
        let cache = client.cache("usertable").await.unwrap().unwrap();
        assert_eq!(cache.name(), "usertable");

        assert_eq!(cache.get("user1").await.unwrap(), None);
        let mut record = Record::new();
        record.insert("field0".to_string(), b"hello".to_vec());
        cache.put("user1", &record).await.unwrap();
        assert_eq!(cache.get("user1").await.unwrap(), Some(record));
        assert!(cache.remove("user1").await.unwrap());
        assert!(!cache.remove("user1").await.unwrap());
    }

    #[tokio::test]
    async fn interrupted_request_fails_later_requests_fast() {
        let address =
            spawn_server_with_delay(vec!["usertable"], Duration::from_millis(200)).await;
        let config = ClientConfiguration::new().set_addresses([address]);
        let client = ThinClientFactory.start_client(&config).await.unwrap();

        let cut_short =
            tokio::time::timeout(Duration::from_millis(20), client.cache_names()).await;
        assert!(cut_short.is_err());

        // the late reply must never be taken for the answer to a newer request
        for _ in 0..3 {
            let err = tokio::time::timeout(Duration::from_secs(1), client.cache_names())
                .await
                .expect("broken connection should fail fast")
                .unwrap_err();
            let msg = format!("{:#}", err);
            assert!(msg.contains("connection to"), "{}", msg);
            assert!(msg.contains("lost"), "{}", msg);
            assert!(err.downcast_ref::<ProtocolError>().is_none());
        }
    }

    #[tokio::test]
    async fn unknown_cache_resolves_to_none() {
        let address = spawn_server(vec!["other"]).await;
        let config = ClientConfiguration::new().set_addresses([address]);
        let client = ThinClientFactory.start_client(&config).await.unwrap();
        assert!(client.cache("usertable").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejected_handshake_fails_start() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = read_frame(&mut socket).await.unwrap();
            let mut w = Writer::new();
            w.u8(0).i16(1).i16(0).i16(0).string("version 1.2.0 is not supported");
            let body = w.into_inner();
            let mut out = (body.len() as i32).to_le_bytes().to_vec();
            out.extend_from_slice(&body);
            socket.write_all(&out).await.unwrap();
        });

        let config = ClientConfiguration::new().set_addresses([address]);
        let err = ThinClientFactory.start_client(&config).await.err().unwrap();
        assert!(format!("{:#}", err).contains("not supported"));
    }

    #[tokio::test]
    async fn no_addresses_is_an_error() {
        let err = ThinClientFactory
            .start_client(&ClientConfiguration::new())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("no addresses"));
    }

    #[tokio::test]
    async fn negative_frame_length_is_rejected() {
        let bytes = (-1i32).to_le_bytes();
        let err = read_frame(&mut &bytes[..]).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<ProtocolError>(),
            Some(&ProtocolError::NegativeLength(-1))
        );

        // rejected from the prefix alone, before any body is read
        let bytes = 0x7fff_ffffi32.to_le_bytes();
        let err = read_frame(&mut &bytes[..]).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<ProtocolError>(),
            Some(&ProtocolError::FrameTooLarge {
                len: 0x7fff_ffff,
                max: protocol::MAX_FRAME_LEN,
            })
        );
    }
}
