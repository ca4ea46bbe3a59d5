use crate::ldap::ber::{BerError, Class, Packet, TAG_SEQUENCE};
use crate::ldap::filter::Filter;
use crate::ldap::{Config, Directory, Entry, ResultCode, Scope, normalize_dn};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

pub const BIND_REQUEST: u32 = 0;
pub const BIND_RESPONSE: u32 = 1;
pub const UNBIND_REQUEST: u32 = 2;
pub const SEARCH_REQUEST: u32 = 3;
pub const SEARCH_RESULT_ENTRY: u32 = 4;
pub const SEARCH_RESULT_DONE: u32 = 5;
pub const ABANDON_REQUEST: u32 = 16;

const SIMPLE_AUTH: u32 = 0;
const ALL_ATTRIBUTES: &str = "*";

const ACCEPT_BACKOFF_START: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Delay between failed accepts, doubling up to a ceiling and starting
/// over once a connection is accepted again.
#[derive(Debug)]
struct AcceptBackoff {
    delay: Duration,
}

impl AcceptBackoff {
    fn new() -> Self {
        AcceptBackoff {
            delay: ACCEPT_BACKOFF_START,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.delay;
        self.delay = std::cmp::min(self.delay * 2, ACCEPT_BACKOFF_MAX);
        delay
    }

    fn reset(&mut self) {
        self.delay = ACCEPT_BACKOFF_START;
    }
}

/// A decoded search operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base_dn: String,
    pub scope: Scope,
    pub deref_aliases: i64,
    /// Maximum number of entries; 0 means unlimited.
    pub size_limit: i64,
    /// Seconds the search may take; 0 means unlimited.
    pub time_limit: i64,
    pub types_only: bool,
    pub filter: Filter,
    pub attributes: Vec<String>,
}

impl SearchRequest {
    pub fn decode(op: &Packet) -> Result<SearchRequest, String> {
        let field = |index: usize| op.child(index).map_err(|e| e.to_string());
        let int = |index: usize| field(index)?.as_i64().map_err(|e| e.to_string());
        let scope = int(1)?;
        Ok(SearchRequest {
            base_dn: field(0)?.as_str().map_err(|e| e.to_string())?,
            scope: Scope::from_code(scope).ok_or_else(|| format!("invalid scope {}", scope))?,
            deref_aliases: int(2)?,
            size_limit: int(3)?,
            time_limit: int(4)?,
            types_only: field(5)?.as_bool().map_err(|e| e.to_string())?,
            filter: Filter::decode(field(6)?).map_err(|e| e.to_string())?,
            attributes: field(7)?
                .children
                .iter()
                .map(Packet::as_str)
                .collect::<Result<_, _>>()
                .map_err(|e| e.to_string())?,
        })
    }

    pub fn encode(&self) -> Packet {
        let scope = match self.scope {
            Scope::BaseObject => 0,
            Scope::SingleLevel => 1,
            Scope::WholeSubtree => 2,
        };
        Packet::constructed(
            Class::Application,
            SEARCH_REQUEST,
            vec![
                Packet::octet_string(&self.base_dn),
                Packet::enumerated(scope),
                Packet::enumerated(self.deref_aliases),
                Packet::integer(self.size_limit),
                Packet::integer(self.time_limit),
                Packet::boolean(self.types_only),
                self.filter.encode(),
                Packet::sequence(self.attributes.iter().map(Packet::octet_string).collect()),
            ],
        )
    }
}

/// Wraps a protocol operation into an LDAPMessage.
pub fn message(message_id: i64, op: Packet) -> Packet {
    Packet::sequence(vec![Packet::integer(message_id), op])
}

fn result(tag: u32, code: ResultCode, diagnostic: &str) -> Packet {
    Packet::constructed(
        Class::Application,
        tag,
        vec![
            Packet::enumerated(code.code()),
            Packet::octet_string(""),
            Packet::octet_string(diagnostic),
        ],
    )
}

/// Splits a message into its id and operation.
fn envelope(packet: &Packet) -> Result<(i64, &Packet), BerError> {
    if !packet.is(Class::Universal, TAG_SEQUENCE) || packet.children.len() < 2 {
        return Err(BerError::invalid("message", "expected a sequence of at least 2 elements"));
    }
    let message_id = packet.children[0].as_i64()?;
    let op = &packet.children[1];
    if op.class != Class::Application {
        return Err(BerError::invalid(
            "message",
            format!("operation has class {:?}", op.class),
        ));
    }
    Ok((message_id, op))
}

/// Serves LDAP connections from a directory snapshot.
pub struct LdapServer {
    name: String,
    directory: RwLock<Arc<Directory>>,
}

impl LdapServer {
    pub fn new(name: impl Into<String>, directory: Directory) -> Self {
        LdapServer {
            name: name.into(),
            directory: RwLock::new(Arc::new(directory)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.info.name, Directory::from_config(config))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> Arc<Directory> {
        Arc::clone(&self.directory.read())
    }

    /// Replaces the served entries. Searches in progress finish against
    /// the directory they started with.
    ///
    /// The directory is built before the lock is taken and the old one is
    /// released after, so the write lock covers only the pointer store.
    pub fn update(&self, config: &Config) {
        let directory = Arc::new(Directory::from_config(config));
        let previous = std::mem::replace(&mut *self.directory.write(), directory);
        drop(previous);
    }

    /// Binds `address` (`:389` listens on every interface) and serves it.
    pub async fn listen(self: Arc<Self>, address: &str) -> std::io::Result<ServerHandle> {
        let address = if address.starts_with(':') {
            format!("0.0.0.0{}", address)
        } else {
            address.to_owned()
        };
        let listener = TcpListener::bind(&address).await?;
        self.serve(listener)
    }

    /// Spawns the accept loop; one task per connection.
    pub fn serve(self: Arc<Self>, listener: TcpListener) -> std::io::Result<ServerHandle> {
        let local_addr = listener.local_addr()?;
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let (closed_tx, closed_rx) = watch::channel(false);
        log::info!("ldap server '{}' listening on {}", self.name, local_addr);

        let task = tokio::spawn(async move {
            let mut connections = JoinSet::new();
            let mut backoff = AcceptBackoff::new();
            loop {
                let mut retry = None;
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            backoff.reset();
                            log::debug!("ldap connection from {} accepted", peer);
                            let server = Arc::clone(&self);
                            let mut closed = closed_rx.clone();
                            connections.spawn(async move {
                                tokio::select! {
                                    served = server.serve_connection(stream) => {
                                        if let Err(e) = served {
                                            log::warn!("ldap connection from {} failed: {}", peer, e);
                                        }
                                    }
                                    _ = closed.changed() => {}
                                }
                                log::debug!("ldap connection from {} closed", peer);
                            });
                        }
                        Err(e) => {
                            let delay = backoff.next_delay();
                            log::error!("ldap accept failed, retrying in {:?}: {}", delay, e);
                            retry = Some(delay);
                        }
                    },
                    _ = &mut stop_rx => break,
                }
                if let Some(delay) = retry {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = &mut stop_rx => break,
                    }
                }
                while connections.try_join_next().is_some() {}
            }
            drop(listener);
            while connections.join_next().await.is_some() {}
        });

        Ok(ServerHandle {
            local_addr,
            stop: Some(stop_tx),
            closed: closed_tx,
            task,
        })
    }

    /// Answers requests on one stream until the peer unbinds or hangs up.
    /// A framing error ends the connection.
    pub async fn serve_connection<S>(&self, mut stream: S) -> Result<(), BerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let Some(packet) = Packet::read_from(&mut stream).await? else {
                return Ok(());
            };
            let (message_id, op) = envelope(&packet)?;
            match op.tag {
                BIND_REQUEST => self.bind(message_id, op, &mut stream).await?,
                UNBIND_REQUEST => return Ok(()),
                SEARCH_REQUEST => self.search(message_id, op, &mut stream).await?,
                ABANDON_REQUEST => log::debug!("ldap abandon of message {}", message_id),
                other => log::warn!("ldap operation with tag {} is not supported", other),
            }
        }
    }

    async fn bind<S>(&self, message_id: i64, op: &Packet, stream: &mut S) -> Result<(), BerError>
    where
        S: AsyncWrite + Unpin,
    {
        let version = op.child(0)?.as_i64()?;
        let (code, diagnostic) = if version != 3 {
            (ResultCode::ProtocolError, "server supports only ldap version 3")
        } else if !op.child(2)?.is(Class::Context, SIMPLE_AUTH) {
            (
                ResultCode::AuthMethodNotSupported,
                "server supports only simple auth method",
            )
        } else {
            log::debug!("ldap bind as '{}'", op.child(1)?.as_str()?);
            (ResultCode::Success, "")
        };
        message(message_id, result(BIND_RESPONSE, code, diagnostic))
            .write_to(stream)
            .await
    }

    async fn search<S>(&self, message_id: i64, op: &Packet, stream: &mut S) -> Result<(), BerError>
    where
        S: AsyncWrite + Unpin,
    {
        let done = |code, diagnostic: &str| message(message_id, result(SEARCH_RESULT_DONE, code, diagnostic));
        let request = match SearchRequest::decode(op) {
            Ok(request) => request,
            Err(e) => {
                return done(ResultCode::ProtocolError, &e).write_to(stream).await;
            }
        };
        log::debug!(
            "ldap search base '{}' scope {:?} filter {:?}",
            request.base_dn,
            request.scope,
            request.filter
        );
        let deadline = u64::try_from(request.time_limit)
            .ok()
            .filter(|secs| *secs > 0)
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        let (code, diagnostic) = self.write_entries(message_id, &request, deadline, stream).await?;
        done(code, diagnostic.as_deref().unwrap_or_default())
            .write_to(stream)
            .await
    }

    /// Writes every matching entry and returns the result code of the
    /// search with an optional diagnostic.
    async fn write_entries<S>(
        &self,
        message_id: i64,
        request: &SearchRequest,
        deadline: Option<Instant>,
        stream: &mut S,
    ) -> Result<(ResultCode, Option<String>), BerError>
    where
        S: AsyncWrite + Unpin,
    {
        let directory = self.directory();
        let base = normalize_dn(&request.base_dn);
        if base.is_empty() && request.scope == Scope::BaseObject {
            let packet = message(message_id, entry_packet(&directory.root, request));
            write_before(deadline, &packet, stream).await?;
            return Ok((ResultCode::Success, None));
        }
        let limit = usize::try_from(request.size_limit).unwrap_or(0);
        let mut sent = 0;
        for (dn, entry) in directory.iter() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok((ResultCode::TimeLimitExceeded, None));
            }
            if !request.scope.contains(&base, dn) {
                continue;
            }
            match request.filter.matches(entry) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => return Ok((ResultCode::UnwillingToPerform, Some(e.to_string()))),
            }
            if limit > 0 && sent >= limit {
                return Ok((ResultCode::SizeLimitExceeded, None));
            }
            let packet = message(message_id, entry_packet(entry, request));
            write_before(deadline, &packet, stream).await?;
            sent += 1;
        }
        Ok((ResultCode::Success, None))
    }
}

/// Writes one packet, giving up at the deadline. A packet cut short leaves
/// the stream unusable, so running out of time is an error here.
async fn write_before<S>(deadline: Option<Instant>, packet: &Packet, stream: &mut S) -> Result<(), BerError>
where
    S: AsyncWrite + Unpin,
{
    let Some(deadline) = deadline else {
        return packet.write_to(stream).await;
    };
    match tokio::time::timeout_at(deadline, packet.write_to(stream)).await {
        Ok(written) => written,
        Err(_) => Err(BerError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "time limit exceeded while writing search results",
        ))),
    }
}

fn entry_packet(entry: &Entry, request: &SearchRequest) -> Packet {
    let everything = request.attributes.is_empty()
        || request.attributes.iter().any(|a| a == ALL_ATTRIBUTES);
    let attributes = entry
        .attributes
        .iter()
        .filter(|(name, _)| {
            everything
                || request
                    .attributes
                    .iter()
                    .any(|wanted| wanted.eq_ignore_ascii_case(name))
        })
        .map(|(name, values)| {
            let values = if request.types_only {
                Vec::new()
            } else {
                values.iter().map(Packet::octet_string).collect()
            };
            Packet::sequence(vec![Packet::octet_string(name), Packet::set(values)])
        })
        .collect();
    Packet::constructed(
        Class::Application,
        SEARCH_RESULT_ENTRY,
        vec![Packet::octet_string(&entry.dn), Packet::sequence(attributes)],
    )
}

/// Controls a running server. Closing first stops accepting, then ends the
/// open connections.
pub struct ServerHandle {
    local_addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    closed: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn close(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = self.closed.send(true);
        if let Err(e) = self.task.await {
            log::warn!("ldap accept loop ended abnormally: {}", e);
        }
    }
}
