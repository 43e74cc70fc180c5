use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::InspectorError;

const READ_CHUNK: usize = 8 * 1024;

#[derive(Default)]
struct MuxState {
    /// Complete units that arrived before anyone asked for them.
    ready: VecDeque<String>,
    /// Subscribers in registration order; the Nth subscriber gets the Nth unit.
    waiting: VecDeque<oneshot::Sender<Result<String, InspectorError>>>,
    /// Once set, every outstanding and future subscriber fails with this.
    dead: Option<InspectorError>,
}

/// Splits the inspector's output stream into discrete reply units, each
/// delimited by the recurring prompt marker, and hands them out in strict
/// FIFO order. There are no correlation ids: pairing is purely positional,
/// so callers must register (via [`ResponseMux::subscribe`]) in the same
/// order they write commands.
///
/// The background reader task drains the stream continuously, which is what
/// makes pipelined command writes safe: the inspector can never stall on a
/// full output pipe while we are still writing commands.
pub struct ResponseMux {
    state: Arc<Mutex<MuxState>>,
    reader: JoinHandle<()>,
}

impl ResponseMux {
    pub fn new<R>(source: R, prompt: &str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let state = Arc::new(Mutex::new(MuxState::default()));
        let reader = tokio::spawn(read_loop(source, prompt.as_bytes().to_vec(), state.clone()));
        Self { state, reader }
    }

    /// Registers for the next unit. Registration is synchronous: the FIFO
    /// position is fixed the moment this returns, before the reply is
    /// awaited. An already-buffered unit resolves without suspending.
    pub fn subscribe(&self) -> PendingReply {
        let mut state = self.state.lock().expect("mux state poisoned");
        if let Some(unit) = state.ready.pop_front() {
            return PendingReply::Ready(Ok(unit));
        }
        if let Some(err) = &state.dead {
            return PendingReply::Ready(Err(err.clone()));
        }
        let (tx, rx) = oneshot::channel();
        state.waiting.push_back(tx);
        PendingReply::Waiting(rx)
    }

    /// Detaches from the stream; every outstanding and future subscriber
    /// fails with [`InspectorError::Disposed`].
    pub fn dispose(&self) {
        self.reader.abort();
        fail_all(&self.state, InspectorError::Disposed);
    }
}

impl Drop for ResponseMux {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// One reserved slot in the reply order.
pub enum PendingReply {
    Ready(Result<String, InspectorError>),
    Waiting(oneshot::Receiver<Result<String, InspectorError>>),
}

impl PendingReply {
    /// Resolves to the raw reply unit, prompt marker included.
    pub async fn recv(self) -> Result<String, InspectorError> {
        match self {
            PendingReply::Ready(result) => result,
            // A dropped sender means the mux was torn down under us.
            PendingReply::Waiting(rx) => rx.await.unwrap_or(Err(InspectorError::Disposed)),
        }
    }
}

async fn read_loop<R>(mut source: R, prompt: Vec<u8>, state: Arc<Mutex<MuxState>>)
where
    R: AsyncRead + Unpin,
{
    let mut pending = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        match source.read(&mut chunk).await {
            Ok(0) => {
                fail_all(&state, InspectorError::Closed);
                return;
            }
            Ok(n) => {
                pending.extend_from_slice(&chunk[..n]);
                while let Some(end) = find_marker(&pending, &prompt) {
                    let unit: Vec<u8> = pending.drain(..end + prompt.len()).collect();
                    deliver(&state, String::from_utf8_lossy(&unit).into_owned());
                }
            }
            Err(err) => {
                fail_all(&state, InspectorError::Stream(err.to_string()));
                return;
            }
        }
    }
}

fn deliver(state: &Mutex<MuxState>, unit: String) {
    let mut state = state.lock().expect("mux state poisoned");
    match state.waiting.pop_front() {
        // The receiver may have given up; the unit was still consumed.
        Some(tx) => drop(tx.send(Ok(unit))),
        None => state.ready.push_back(unit),
    }
}

fn fail_all(state: &Mutex<MuxState>, err: InspectorError) {
    let mut state = state.lock().expect("mux state poisoned");
    // The first terminal error wins; a dispose after EOF stays EOF.
    let err = state.dead.get_or_insert(err).clone();
    for tx in state.waiting.drain(..) {
        drop(tx.send(Err(err.clone())));
    }
}

fn find_marker(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
