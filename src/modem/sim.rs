//! Scripted stand-in for a modem on the other end of a serial cable.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::Duration;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;

use super::Connector;

/// What the simulated modem does after receiving a complete line.
#[derive(Clone, Debug)]
pub(crate) enum Response {
    Reply(&'static [u8]),
    /// Sends the reply only once the delay has passed.
    Delayed(Duration, &'static [u8]),
    Silence,
    /// Sends the given bytes, then ends the stream.
    Hangup(&'static [u8]),
}

#[derive(Debug, Default)]
pub(crate) struct Transcript {
    pub writes: usize,
    pub reads: usize,
    pub lines: Vec<Vec<u8>>,
}

impl Transcript {
    pub fn lines_as_text(&self) -> Vec<String> {
        self.lines.iter().map(|l| String::from_utf8_lossy(l).into_owned()).collect()
    }
}

pub(crate) struct SimulatedModem {
    script: VecDeque<Response>,
    received: Vec<u8>,
    outgoing: BytesMut,
    delayed: Option<(Pin<Box<Sleep>>, &'static [u8])>,
    read_limit: usize,
    hung_up: bool,
    reader: Option<Waker>,
    transcript: Arc<Mutex<Transcript>>,
}

impl SimulatedModem {
    pub fn new(script: impl IntoIterator<Item = Response>) -> Self {
        Self {
            script: script.into_iter().collect(),
            received: Vec::new(),
            outgoing: BytesMut::new(),
            delayed: None,
            read_limit: usize::MAX,
            hung_up: false,
            reader: None,
            transcript: Arc::default(),
        }
    }

    /// Replies to each command in turn with the given lines.
    pub fn replying(replies: &[&'static str]) -> Self {
        Self::new(replies.iter().map(|r| Response::Reply(r.as_bytes())))
    }

    /// Bytes the modem sends before any command, e.g. inbound acoustic data.
    pub fn with_unsolicited(mut self, data: &[u8]) -> Self {
        self.outgoing.extend_from_slice(data);
        self
    }

    /// Hands out at most `limit` bytes per read, like a slow serial line.
    pub fn with_read_limit(mut self, limit: usize) -> Self {
        self.read_limit = limit;
        self
    }

    pub fn transcript(&self) -> Arc<Mutex<Transcript>> {
        self.transcript.clone()
    }

    fn line_received(&mut self) {
        let mut line = std::mem::take(&mut self.received);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        self.transcript.lock().unwrap().lines.push(line);
        match self.script.pop_front() {
            Some(Response::Reply(reply)) => self.outgoing.extend_from_slice(reply),
            Some(Response::Delayed(delay, reply)) => self.delayed = Some((Box::pin(tokio::time::sleep(delay)), reply)),
            Some(Response::Hangup(last_words)) => {
                self.outgoing.extend_from_slice(last_words);
                self.hung_up = true;
            }
            Some(Response::Silence) | None => {}
        }
        if let Some(waker) = self.reader.take() {
            waker.wake();
        }
    }
}

impl AsyncWrite for SimulatedModem {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.transcript.lock().unwrap().writes += 1;
        for &b in buf {
            if b == b'\n' {
                this.line_received();
            } else {
                this.received.push(b);
            }
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for SimulatedModem {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some((sleep, reply)) = this.delayed.as_mut() {
            if sleep.as_mut().poll(cx).is_ready() {
                this.outgoing.extend_from_slice(*reply);
                this.delayed = None;
            }
        }
        if !this.outgoing.is_empty() {
            let n = buf.remaining().min(this.outgoing.len()).min(this.read_limit);
            buf.put_slice(&this.outgoing.split_to(n));
            this.transcript.lock().unwrap().reads += 1;
            Poll::Ready(Ok(()))
        } else if this.hung_up {
            this.transcript.lock().unwrap().reads += 1;
            Poll::Ready(Ok(()))
        } else {
            this.reader = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

/// Hands out simulated modems one connection at a time, and reports the
/// port as busy once they run out.
pub(crate) struct SimConnector {
    modems: Mutex<VecDeque<SimulatedModem>>,
    bauds: Mutex<Vec<u32>>,
}

impl SimConnector {
    pub fn new(modem: SimulatedModem) -> Self {
        Self::sequence([modem])
    }

    pub fn sequence(modems: impl IntoIterator<Item = SimulatedModem>) -> Self {
        Self {
            modems: Mutex::new(modems.into_iter().collect()),
            bauds: Mutex::default(),
        }
    }

    pub fn busy() -> Self {
        Self::sequence(Vec::new())
    }

    /// Baud rates of every successful connection, in order.
    pub fn bauds(&self) -> Vec<u32> {
        self.bauds.lock().unwrap().clone()
    }
}

impl Connector for SimConnector {
    type Stream = SimulatedModem;

    fn connect(&self, _port: &str, baud: u32) -> io::Result<SimulatedModem> {
        let modem = self
            .modems
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "Device or resource busy"))?;
        self.bauds.lock().unwrap().push(baud);
        Ok(modem)
    }
}
