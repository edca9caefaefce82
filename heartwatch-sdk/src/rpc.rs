//! Newline-delimited JSON RPC over any async byte stream.
//!
//! A [`Peer`] owns one connection. It spawns a reader task that answers
//! incoming requests through a [`Handler`] and routes incoming responses to
//! waiting callers, and a writer task that drains an outbound queue.
//! Either side of a connection may call the other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use heartwatch_types::{Call, Frame, Reply};
use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Outbound frames buffered before senders wait.
const OUTBOUND_BUFFER: usize = 64;

/// Longest accepted frame, newline excluded. A longer line closes the peer.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Answers calls arriving on a connection.
///
/// Handlers run on the connection's reader task and must not wait on calls
/// to the same peer.
pub trait Handler: Send + Sync + 'static {
    /// Answer one incoming call.
    fn handle(&self, peer: &Arc<Peer>, call: Call) -> Reply;

    /// Called once after the connection has closed.
    fn on_close(&self, _peer: &Arc<Peer>) {}
}

/// One end of an RPC connection.
pub struct Peer {
    label: String,
    outbound: mpsc::Sender<Frame>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl Peer {
    /// Start serving a connection.
    ///
    /// `label` identifies the connection in logs (usually the remote
    /// address).
    pub fn spawn<R, W, H>(reader: R, writer: W, handler: Arc<H>, label: impl Into<String>) -> Arc<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        H: Handler,
    {
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let peer = Arc::new(Self {
            label: label.into(),
            outbound,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            shutdown,
        });

        tokio::spawn(write_loop(
            writer,
            outbound_rx,
            shutdown_rx.clone(),
            Arc::downgrade(&peer),
        ));
        tokio::spawn(read_loop(reader, peer.clone(), handler, shutdown_rx));

        peer
    }

    /// Connection label used in logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns true once either task has stopped.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the connection. Pending and future calls fail with `Closed`.
    pub fn close(&self) {
        self.mark_closed();
        let _ = self.shutdown.send(true);
    }

    /// Issue a call and wait for the reply.
    ///
    /// Waits indefinitely; wrap in `tokio::time::timeout` to bound it. A
    /// call abandoned by its caller is removed from the pending table.
    pub async fn request(&self, call: Call) -> Result<bool> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        let _guard = PendingCall { peer: self, id };

        // Closing clears the table; re-check so a call that raced the close
        // does not wait forever.
        if self.is_closed() {
            return Err(Error::Closed);
        }

        debug!(peer = %self.label, id, method = call.method(), "Sending request");
        self.outbound
            .send(Frame::Request { id, call })
            .await
            .map_err(|_| Error::Closed)?;

        match rx.await {
            Ok(Reply::Value(value)) => Ok(value),
            Ok(Reply::Error(message)) => Err(Error::Remote(message)),
            Err(_) => Err(Error::Closed),
        }
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
        // Dropping the senders wakes every waiting caller with `Closed`.
        self.pending.lock().clear();
    }

    async fn dispatch<H: Handler>(self: &Arc<Self>, frame: Frame, handler: &H) {
        match frame {
            Frame::Request { id, call } => {
                debug!(peer = %self.label, id, method = call.method(), "Handling request");
                let reply = handler.handle(self, call);
                if self.outbound.send(Frame::Response { id, reply }).await.is_err() {
                    debug!(peer = %self.label, id, "Writer gone, dropping reply");
                }
            }
            Frame::Response { id, reply } => {
                let waiter = self.pending.lock().remove(&id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => debug!(peer = %self.label, id, "Response for unknown or abandoned call"),
                }
            }
        }
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("label", &self.label)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for Peer {
    fn is_closed(&self) -> bool {
        Peer::is_closed(self)
    }

    async fn call(&self, call: Call) -> Result<bool> {
        self.request(call).await
    }

    fn close(&self) {
        Peer::close(self)
    }
}

/// Removes an abandoned call from the pending table when dropped.
struct PendingCall<'a> {
    peer: &'a Peer,
    id: u64,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        self.peer.pending.lock().remove(&self.id);
    }
}

async fn read_loop<R, H>(
    reader: R,
    peer: Arc<Peer>,
    handler: Arc<H>,
    mut shutdown: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
    H: Handler,
{
    let mut reader = BufReader::new(reader);

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            line = read_line(&mut reader) => match line {
                Ok(Line::Frame(bytes)) => {
                    let line = String::from_utf8_lossy(&bytes);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Frame>(line) {
                        Ok(frame) => peer.dispatch(frame, handler.as_ref()).await,
                        Err(e) => warn!(peer = %peer.label, "Dropping malformed frame: {}", e),
                    }
                }
                Ok(Line::TooLong) => {
                    warn!(peer = %peer.label, "Frame longer than {} bytes, closing", MAX_FRAME_LEN);
                    break;
                }
                Ok(Line::Eof) => {
                    debug!(peer = %peer.label, "Connection closed by remote");
                    break;
                }
                Err(e) => {
                    warn!(peer = %peer.label, "Read error: {}", e);
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }

    peer.close();
    handler.on_close(&peer);
}

enum Line {
    Frame(Vec<u8>),
    TooLong,
    Eof,
}

/// Read up to and including the next newline, never buffering more than
/// [`MAX_FRAME_LEN`] bytes of it.
async fn read_line<R>(reader: &mut R) -> std::io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    let mut bytes = Vec::new();
    let read = (&mut *reader)
        .take(MAX_FRAME_LEN as u64 + 1)
        .read_until(b'\n', &mut bytes)
        .await?;

    if read == 0 {
        return Ok(Line::Eof);
    }
    if bytes.last() != Some(&b'\n') && bytes.len() > MAX_FRAME_LEN {
        return Ok(Line::TooLong);
    }
    Ok(Line::Frame(bytes))
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Frame>,
    mut shutdown: watch::Receiver<bool>,
    peer: Weak<Peer>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = shutdown.changed() => break,
        };

        if let Err(e) = write_frame(&mut writer, &frame).await {
            if let Some(peer) = peer.upgrade() {
                warn!(peer = %peer.label, "Write error: {}", e);
                peer.close();
            }
            break;
        }
    }

    // Shutting down the write half tells the remote we are gone.
    let _ = writer.shutdown().await;
}

async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::duplex;

    /// Answers every call with whether the name is "yes".
    struct Echo;

    impl Handler for Echo {
        fn handle(&self, _peer: &Arc<Peer>, call: Call) -> Reply {
            match call {
                Call::Check { name } | Call::Ping { name } => Reply::Value(name == "yes"),
                Call::Hello { .. } => Reply::Error("no hello here".to_string()),
            }
        }
    }

    fn pair() -> (Arc<Peer>, Arc<Peer>) {
        let (a, b) = duplex(4096);
        let (ar, aw) = tokio::io::split(a);
        let (br, bw) = tokio::io::split(b);
        let left = Peer::spawn(ar, aw, Arc::new(Echo), "left");
        let right = Peer::spawn(br, bw, Arc::new(Echo), "right");
        (left, right)
    }

    fn check(name: &str) -> Call {
        Call::Check {
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn calls_flow_in_both_directions() {
        let (left, right) = pair();

        assert!(left.request(check("yes")).await.unwrap());
        assert!(!left.request(check("no")).await.unwrap());
        assert!(right.request(check("yes")).await.unwrap());
    }

    #[tokio::test]
    async fn error_reply_becomes_remote_error() {
        let (left, _right) = pair();

        let hello = Call::Hello {
            name: "x".to_string(),
            version: Default::default(),
        };
        match left.request(hello).await {
            Err(Error::Remote(message)) => assert_eq!(message, "no hello here"),
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn closing_one_side_closes_the_other() {
        let (left, right) = pair();

        left.close();
        assert!(left.is_closed());
        assert!(matches!(left.request(check("yes")).await, Err(Error::Closed)));

        tokio::time::timeout(Duration::from_secs(1), async {
            while !right.is_closed() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("remote side should observe the close");
    }

    #[tokio::test]
    async fn abandoned_call_is_removed_from_pending() {
        // The far end never answers: nothing reads the other half.
        let (a, _b) = duplex(4096);
        let (ar, aw) = tokio::io::split(a);
        let peer = Peer::spawn(ar, aw, Arc::new(Echo), "lonely");

        let result = tokio::time::timeout(Duration::from_millis(20), peer.request(check("yes"))).await;
        assert!(result.is_err());
        assert!(peer.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn oversized_line_closes_the_peer() {
        let (a, b) = duplex(4096);
        let (ar, aw) = tokio::io::split(a);
        let (_br, mut bw) = tokio::io::split(b);
        let peer = Peer::spawn(ar, aw, Arc::new(Echo), "target");

        // No newline anywhere, so the reader has to give up on its own.
        tokio::spawn(async move {
            let _ = bw.write_all(&vec![b'x'; MAX_FRAME_LEN * 2]).await;
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while !peer.is_closed() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("an oversized frame should close the peer");
    }

    #[tokio::test]
    async fn frame_at_the_limit_is_accepted() {
        let (a, b) = duplex(4096);
        let (ar, aw) = tokio::io::split(a);
        let (br, mut bw) = tokio::io::split(b);
        let _peer = Peer::spawn(ar, aw, Arc::new(Echo), "target");

        let frame = "{\"frame\":\"request\",\"id\":3,\"call\":{\"method\":\"check\",\"name\":\"yes\"}}";
        let padded = format!("{}{}\n", " ".repeat(MAX_FRAME_LEN - frame.len()), frame);
        tokio::spawn(async move {
            let _ = bw.write_all(padded.as_bytes()).await;
        });

        let mut lines = BufReader::new(br).lines();
        let line = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let frame: Frame = serde_json::from_str(&line).unwrap();
        assert_eq!(
            frame,
            Frame::Response {
                id: 3,
                reply: Reply::Value(true)
            }
        );
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let (a, b) = duplex(4096);
        let (ar, aw) = tokio::io::split(a);
        let (br, mut bw) = tokio::io::split(b);
        let _peer = Peer::spawn(ar, aw, Arc::new(Echo), "target");

        bw.write_all(b"not json\n\n").await.unwrap();
        bw.write_all(b"{\"frame\":\"request\",\"id\":7,\"call\":{\"method\":\"check\",\"name\":\"yes\"}}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(br).lines();
        let line = tokio::time::timeout(Duration::from_secs(1), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let frame: Frame = serde_json::from_str(&line).unwrap();
        assert_eq!(
            frame,
            Frame::Response {
                id: 7,
                reply: Reply::Value(true)
            }
        );
    }
}
