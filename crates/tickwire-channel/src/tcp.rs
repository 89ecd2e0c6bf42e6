//! TCP transport over tokio sockets.
//!
//! Connect, send and (by default) receive run as tasks on the channel's
//! runtime. Every task holds the socket's cancellation token and exits
//! quietly once the socket is disposed.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, TryLockError};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::channel::{AddressFamily, Transport};
use crate::core::ChannelCore;
use crate::error::{ChannelError, NetworkErrorKind, Result};
use crate::event::UserData;
use crate::sync::lock;

struct WriterHandle {
    token: CancellationToken,
    jobs: mpsc::UnboundedSender<Bytes>,
}

struct SyncReader {
    token: CancellationToken,
    read_half: OwnedReadHalf,
}

#[derive(Default)]
struct Sockets {
    writer: Mutex<Option<WriterHandle>>,
    reader: Mutex<Option<SyncReader>>,
}

impl Sockets {
    /// Drop the halves whose socket token has been cancelled.
    ///
    /// The read half is skipped while `process_receive` holds it; that loop
    /// drops it itself once it sees the cancelled token.
    fn release_disposed(&self) {
        {
            let mut writer = lock(&self.writer);
            if writer.as_ref().is_some_and(|handle| handle.token.is_cancelled()) {
                *writer = None;
            }
        }

        let mut reader = match self.reader.try_lock() {
            Ok(reader) => reader,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return,
        };
        if reader.as_ref().is_some_and(|reader| reader.token.is_cancelled()) {
            *reader = None;
            trace!("released disposed read half");
        }
    }
}

pub(crate) struct TcpTransport {
    runtime: Handle,
    sync_receive: bool,
    sockets: Arc<Sockets>,
}

impl TcpTransport {
    pub(crate) fn new(runtime: Handle, sync_receive: bool) -> Self {
        Self {
            runtime,
            sync_receive,
            sockets: Arc::new(Sockets::default()),
        }
    }
}

impl Transport for TcpTransport {
    fn connect(
        &self,
        core: &Arc<ChannelCore>,
        addr: SocketAddr,
        user_data: Option<UserData>,
    ) -> Result<()> {
        core.close();
        self.sockets.release_disposed();

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        };
        let socket = match socket {
            Ok(socket) => socket,
            Err(err) => {
                let err = ChannelError::from_io(NetworkErrorKind::SocketCreation, &err);
                core.report(&err);
                return Err(err);
            }
        };

        core.helper().prepare_for_connecting();
        let token = core.begin_connecting(AddressFamily::of(&addr), addr);
        debug!(channel = %core.name(), %addr, "connecting");

        let core = Arc::clone(core);
        let sockets = Arc::clone(&self.sockets);
        let sync_receive = self.sync_receive;
        self.runtime.spawn(async move {
            let connected = tokio::select! {
                _ = token.cancelled() => return,
                result = socket.connect(addr) => result,
            };
            match connected {
                Ok(stream) => establish(core, sockets, token, stream, user_data, sync_receive),
                Err(err) => {
                    core.fail_for(&token, ChannelError::from_io(NetworkErrorKind::Connect, &err))
                }
            }
        });
        Ok(())
    }

    fn process_send(&self, core: &ChannelCore) -> Result<()> {
        let jobs = match lock(&self.sockets.writer).as_ref() {
            Some(handle) if !handle.token.is_cancelled() => handle.jobs.clone(),
            _ => return Ok(()),
        };

        let Some(bytes) = core.drain_send_queue()? else {
            return Ok(());
        };
        if jobs.send(bytes).is_err() {
            return Err(ChannelError::new(
                NetworkErrorKind::Send,
                "send task is no longer running",
            ));
        }
        Ok(())
    }

    fn process_receive(&self, core: &ChannelCore) -> Result<()> {
        if !self.sync_receive {
            return Ok(());
        }

        let mut slot = lock(&self.sockets.reader);
        let mut buf = Vec::new();
        loop {
            let Some(reader) = slot.as_mut() else {
                return Ok(());
            };
            if reader.token.is_cancelled() {
                *slot = None;
                return Ok(());
            }
            let token = reader.token.clone();

            buf.resize(core.receive_remaining(), 0);
            match reader.read_half.try_read(&mut buf) {
                Ok(0) => {
                    *slot = None;
                    drop(slot);
                    debug!(channel = %core.name(), "remote closed connection");
                    core.close_for(&token);
                    return Ok(());
                }
                Ok(n) => core.on_received(&token, &buf[..n])?,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(ChannelError::from_io(NetworkErrorKind::Receive, &err)),
            }
        }
    }

    fn release(&self) {
        self.sockets.release_disposed();
    }
}

fn establish(
    core: Arc<ChannelCore>,
    sockets: Arc<Sockets>,
    token: CancellationToken,
    stream: TcpStream,
    user_data: Option<UserData>,
    sync_receive: bool,
) {
    if let Err(err) = stream.set_nodelay(true) {
        warn!(channel = %core.name(), error = %err, "failed to disable nagle");
    }
    let local = match stream.local_addr() {
        Ok(local) => local,
        Err(err) => {
            core.fail_for(&token, ChannelError::from_io(NetworkErrorKind::Connect, &err));
            return;
        }
    };

    let (read_half, write_half) = stream.into_split();
    let (jobs, job_rx) = mpsc::unbounded_channel();
    {
        let mut writer = lock(&sockets.writer);
        if token.is_cancelled() {
            return;
        }
        *writer = Some(WriterHandle {
            token: token.clone(),
            jobs,
        });
    }
    let read_half = if sync_receive {
        *lock(&sockets.reader) = Some(SyncReader {
            token: token.clone(),
            read_half,
        });
        // Failures cancel the token without passing through `close`.
        let sockets = Arc::clone(&sockets);
        let disposed = token.clone();
        tokio::spawn(async move {
            disposed.cancelled().await;
            sockets.release_disposed();
        });
        None
    } else {
        Some(read_half)
    };

    if !core.complete_connect(&token, local, user_data) {
        return;
    }

    tokio::spawn(write_loop(Arc::clone(&core), token.clone(), write_half, job_rx));
    if let Some(read_half) = read_half {
        tokio::spawn(read_loop(core, token, read_half));
    }
}

async fn write_loop(
    core: Arc<ChannelCore>,
    token: CancellationToken,
    mut writer: OwnedWriteHalf,
    mut jobs: mpsc::UnboundedReceiver<Bytes>,
) {
    loop {
        let mut buf = tokio::select! {
            _ = token.cancelled() => return,
            job = jobs.recv() => match job {
                Some(buf) => buf,
                None => return,
            },
        };

        while buf.has_remaining() {
            let written = tokio::select! {
                _ = token.cancelled() => return,
                result = writer.write(&buf) => result,
            };
            match written {
                Ok(0) => {
                    let err = std::io::Error::from(ErrorKind::WriteZero);
                    core.fail_for(&token, ChannelError::from_io(NetworkErrorKind::Send, &err));
                    return;
                }
                Ok(n) => {
                    trace!(channel = %core.name(), size = n, "bytes written");
                    buf.advance(n);
                    core.advance_send(&token, n);
                }
                Err(err) => {
                    core.fail_for(&token, ChannelError::from_io(NetworkErrorKind::Send, &err));
                    return;
                }
            }
        }
        core.complete_send(&token);
    }
}

async fn read_loop(core: Arc<ChannelCore>, token: CancellationToken, mut reader: OwnedReadHalf) {
    let mut buf = Vec::new();
    loop {
        buf.resize(core.receive_remaining(), 0);
        let read = tokio::select! {
            _ = token.cancelled() => return,
            result = reader.read(&mut buf) => result,
        };
        match read {
            Ok(0) => {
                debug!(channel = %core.name(), "remote closed connection");
                core.close_for(&token);
                return;
            }
            Ok(n) => {
                if let Err(err) = core.on_received(&token, &buf[..n]) {
                    core.fail_for(&token, err);
                    return;
                }
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                core.fail_for(&token, ChannelError::from_io(NetworkErrorKind::Receive, &err));
                return;
            }
        }
    }
}
