//! Localhost TCP intent port.
//!
//! One accept thread, plus a reader and a writer thread per client. Readers decode request
//! lines and submit them to the [`IntentSender`]; everything bound for a client (ready
//! line, acks, outcomes, telemetry) goes through that client's outbound channel, which its
//! writer drains. Outcome callbacks run on the tick thread and only push into the channel.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use engine::{
    decode_request, rejection_outcome, Frame, IntentSender, ServerMessage, PROTOCOL_VERSION,
};
use tracing::{info, warn};

use super::loop_runner::HostError;

/// Frames are skipped for a client whose unwritten backlog would pass this many bytes.
const MAX_PENDING_TELEMETRY_BYTES_PER_CLIENT: usize = 64 * 1024;
/// Acks and outcomes are dropped once a client's unwritten backlog would pass this many bytes.
const MAX_PENDING_CONTROL_BYTES_PER_CLIENT: usize = 256 * 1024;
/// A request line longer than this closes the connection.
const MAX_REQUEST_LINE_BYTES: usize = 16 * 1024;

static CLIENTS_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

/// Sending half of one client's line queue, with a count of bytes not yet written.
#[derive(Debug, Clone)]
struct Outbound {
    client_id: u64,
    diag: bool,
    lines: Sender<String>,
    pending_bytes: Arc<AtomicUsize>,
}

impl Outbound {
    fn new(client_id: u64, diag: bool) -> (Self, Receiver<String>) {
        let (lines, pending) = unbounded::<String>();
        let outbound = Self {
            client_id,
            diag,
            lines,
            pending_bytes: Arc::new(AtomicUsize::new(0)),
        };
        (outbound, pending)
    }

    fn pending_bytes(&self) -> usize {
        self.pending_bytes.load(Ordering::Relaxed)
    }

    fn push_control(&self, message: &ServerMessage) {
        let line = match message.encode_line() {
            Ok(line) => line,
            Err(err) => {
                warn!(client_id = self.client_id, error = %err, "thruport_message_encode_failed");
                return;
            }
        };
        let backlog = self.pending_bytes();
        if backlog.saturating_add(line.len()) > MAX_PENDING_CONTROL_BYTES_PER_CLIENT {
            warn!(
                client_id = self.client_id,
                backlog,
                bytes = line.len(),
                "thruport_control_line_dropped_over_cap"
            );
            return;
        }
        self.enqueue(line);
    }

    /// Returns `false` once the client's writer has gone away.
    fn push_telemetry(&self, line: &str) -> bool {
        let backlog = self.pending_bytes();
        if backlog.saturating_add(line.len()) > MAX_PENDING_TELEMETRY_BYTES_PER_CLIENT {
            if self.diag {
                info!(
                    client_id = self.client_id,
                    backlog, "thruport_diag_drop_telemetry_line"
                );
            }
            return true;
        }
        self.enqueue(line.to_string())
    }

    fn enqueue(&self, line: String) -> bool {
        let bytes = line.len();
        self.pending_bytes.fetch_add(bytes, Ordering::Relaxed);
        if self.lines.send(line).is_err() {
            self.pending_bytes.fetch_sub(bytes, Ordering::Relaxed);
            if self.diag {
                info!(client_id = self.client_id, bytes, "thruport_diag_drop_line_client_gone");
            }
            return false;
        }
        true
    }
}

#[derive(Debug)]
struct ClientHandle {
    client_id: u64,
    outbound: Outbound,
}

#[derive(Debug)]
struct Shared {
    diag: bool,
    bound_port: u16,
    next_client_id: AtomicU64,
    clients: Mutex<Vec<ClientHandle>>,
}

impl Shared {
    fn lock_clients(&self) -> MutexGuard<'_, Vec<ClientHandle>> {
        match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                if CLIENTS_LOCK_POISON_WARNED
                    .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    warn!("thruport client list lock poisoned; recovered inner value");
                }
                poisoned.into_inner()
            }
        }
    }

    fn remove_client(&self, client_id: u64) {
        self.lock_clients()
            .retain(|client| client.client_id != client_id);
        info!(client_id, "thruport_client_disconnected");
    }
}

#[derive(Debug)]
pub(crate) struct Thruport {
    shared: Arc<Shared>,
}

impl Thruport {
    pub(crate) fn start(port: u16, diag: bool, intents: IntentSender) -> Result<Self, HostError> {
        let listener = TcpListener::bind(localhost_bind_addr(port))
            .map_err(|source| HostError::Bind { port, source })?;
        let bound_port = listener
            .local_addr()
            .map_err(|source| HostError::Bind { port, source })?
            .port();

        let shared = Arc::new(Shared {
            diag,
            bound_port,
            next_client_id: AtomicU64::new(1),
            clients: Mutex::new(Vec::new()),
        });
        let accept_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name("thruport-accept".to_string())
            .spawn(move || accept_loop(listener, accept_shared, intents))
            .map_err(HostError::Spawn)?;

        info!(port = bound_port, version = PROTOCOL_VERSION, "thruport_ready_bound");
        Ok(Self { shared })
    }

    pub(crate) fn bound_port(&self) -> u16 {
        self.shared.bound_port
    }

    pub(crate) fn connected_clients(&self) -> usize {
        self.shared.lock_clients().len()
    }

    /// Sends a frame to every client that is keeping up; drops clients whose writer is gone.
    pub(crate) fn broadcast_frame(&self, frame: Frame) {
        let line = match ServerMessage::Frame(frame).encode_line() {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "thruport_frame_encode_failed");
                return;
            }
        };
        self.shared
            .lock_clients()
            .retain(|client| client.outbound.push_telemetry(&line));
    }
}

fn localhost_bind_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>, intents: IntentSender) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                if let Err(err) = attach_client(stream, &shared, &intents) {
                    warn!(error = %err, "thruport_client_attach_failed");
                }
            }
            Err(err) => warn!(error = %err, "thruport_accept_failed"),
        }
    }
}

fn attach_client(stream: TcpStream, shared: &Arc<Shared>, intents: &IntentSender) -> io::Result<()> {
    if let Err(err) = stream.set_nodelay(true) {
        warn!(error = %err, "thruport_client_nodelay_failed");
    }
    let client_id = shared.next_client_id.fetch_add(1, Ordering::Relaxed);
    let write_half = stream.try_clone()?;
    let (outbound, pending) = Outbound::new(client_id, shared.diag);

    outbound.push_control(&ServerMessage::Ready {
        version: PROTOCOL_VERSION,
        port: shared.bound_port,
    });

    let written = Arc::clone(&outbound.pending_bytes);
    let diag = shared.diag;
    thread::Builder::new()
        .name(format!("thruport-writer-{client_id}"))
        .spawn(move || write_loop(write_half, pending, &written, client_id, diag))?;

    shared.lock_clients().push(ClientHandle {
        client_id,
        outbound: outbound.clone(),
    });

    let reader_shared = Arc::clone(shared);
    let reader_intents = intents.clone();
    let spawned = thread::Builder::new()
        .name(format!("thruport-reader-{client_id}"))
        .spawn(move || {
            read_loop(stream, &reader_intents, &outbound);
            reader_shared.remove_client(client_id);
        });
    if let Err(err) = spawned {
        shared.remove_client(client_id);
        return Err(err);
    }

    info!(client_id, "thruport_client_connected");
    Ok(())
}

fn write_loop(
    mut stream: TcpStream,
    pending: Receiver<String>,
    pending_bytes: &AtomicUsize,
    client_id: u64,
    diag: bool,
) {
    for line in pending.iter() {
        let result = stream.write_all(line.as_bytes());
        pending_bytes.fetch_sub(line.len(), Ordering::Relaxed);
        if let Err(err) = result {
            warn!(client_id, error = %err, "thruport_client_write_failed");
            return;
        }
        if diag {
            info!(client_id, bytes = line.len(), "thruport_diag_line_written");
        }
    }
}

fn read_loop(stream: TcpStream, intents: &IntentSender, outbound: &Outbound) {
    let client_id = outbound.client_id;
    let mut reader = BufReader::new(stream);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        let limit = (MAX_REQUEST_LINE_BYTES + 1) as u64;
        match (&mut reader).take(limit).read_until(b'\n', &mut buffer) {
            Ok(0) => return,
            Ok(_) => {}
            Err(err) => {
                warn!(client_id, error = %err, "thruport_client_read_failed");
                return;
            }
        }

        if buffer.last().copied() == Some(b'\n') {
            buffer.pop();
        } else if buffer.len() > MAX_REQUEST_LINE_BYTES {
            warn!(
                client_id,
                limit = MAX_REQUEST_LINE_BYTES,
                "thruport_request_line_over_cap"
            );
            let message = format!("request line longer than {MAX_REQUEST_LINE_BYTES} bytes");
            outbound.push_control(&ServerMessage::Outcome(rejection_outcome(None, message)));
            return;
        }
        if buffer.last().copied() == Some(b'\r') {
            buffer.pop();
        }

        match std::str::from_utf8(&buffer) {
            Ok(line) => {
                if outbound.diag {
                    info!(client_id, line = %line, "thruport_diag_remote_line_read");
                }
                if !handle_request_line(line, intents, outbound) {
                    return;
                }
            }
            Err(err) => warn!(client_id, error = %err, "thruport_invalid_utf8_line_dropped"),
        }
    }
}

/// Returns `false` once the tick loop has stopped accepting intents.
fn handle_request_line(line: &str, intents: &IntentSender, outbound: &Outbound) -> bool {
    let client_id = outbound.client_id;
    let line = line.trim();
    if line.is_empty() {
        return true;
    }

    let request = match decode_request(line) {
        Ok(request) => request,
        Err(err) => {
            warn!(client_id, error = %err, "thruport_request_undecodable");
            let outcome = rejection_outcome(err.correlation_id().cloned(), err.to_string());
            outbound.push_control(&ServerMessage::Outcome(outcome));
            return true;
        }
    };

    let id = request.id.clone();
    let kind = match request.into_intent() {
        Ok(kind) => kind,
        Err(rejection) => {
            warn!(client_id, id = %id, error = %rejection, "thruport_request_rejected");
            let outcome = rejection_outcome(Some(id), rejection.to_string());
            outbound.push_control(&ServerMessage::Outcome(outcome));
            return true;
        }
    };

    let reply = outbound.clone();
    let submitted = intents.submit(id.clone(), kind, move |outcome| {
        reply.push_control(&ServerMessage::Outcome(outcome));
    });
    match submitted {
        Ok(ack) => {
            outbound.push_control(&ServerMessage::from(ack));
            true
        }
        Err(err) => {
            warn!(client_id, id = %id, error = %err, "thruport_submit_failed");
            outbound.push_control(&ServerMessage::Outcome(rejection_outcome(
                Some(id),
                err.to_string(),
            )));
            false
        }
    }
}
