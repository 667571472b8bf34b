//! Framed delivery of encoded tasks to the solver.
//!
//! On a byte stream every frame is a little-endian `u32` payload length, one
//! flag byte (`1` when more frames of the same task follow) and the payload.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::protocol::{ProtocolError, decode_task, encode_task};
use crate::task::AnnotationTask;

pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge { len: usize },
    #[error("Invalid frame flag {flag}")]
    InvalidFlag { flag: u8 },
    #[error("Stream ended inside a task")]
    UnexpectedEof,
    #[error("Frame channel closed")]
    Closed,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: Bytes,
    /// More frames of the same task follow.
    pub more: bool,
}

#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Bytes, more: bool) -> TransportResult<()>;

    async fn flush(&mut self) -> TransportResult<()> {
        Ok(())
    }
}

/// Writes all frames of `task` back to back, the last one without the more
/// flag. Returns the number of frames sent.
///
/// Every frame is size-checked before the first one is written, so a task
/// that cannot be sent leaves the sink untouched.
pub async fn send_task<S>(sink: &mut S, task: &AnnotationTask) -> TransportResult<usize>
where
    S: FrameSink + ?Sized,
{
    let frames = encode_task(task);
    if let Some(frame) = frames.iter().find(|frame| frame.len() > MAX_FRAME_LEN) {
        return Err(TransportError::FrameTooLarge { len: frame.len() });
    }
    let count = frames.len();
    for (index, frame) in frames.into_iter().enumerate() {
        sink.send(frame, index + 1 < count).await?;
    }
    sink.flush().await?;
    Ok(count)
}

/// Frame sink over any async byte stream.
#[derive(Debug)]
pub struct StreamFrameSink<W: AsyncWrite + Unpin + Send> {
    writer: BufWriter<W>,
}

pub type TcpFrameSink = StreamFrameSink<TcpStream>;

impl<W: AsyncWrite + Unpin + Send> StreamFrameSink<W> {
    pub fn new(stream: W) -> Self {
        Self {
            writer: BufWriter::new(stream),
        }
    }
}

impl TcpFrameSink {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> TransportResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FrameSink for StreamFrameSink<W> {
    async fn send(&mut self, frame: Bytes, more: bool) -> TransportResult<()> {
        if frame.len() > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge { len: frame.len() });
        }
        self.writer.write_u32_le(frame.len() as u32).await?;
        self.writer.write_u8(more as u8).await?;
        self.writer.write_all(&frame).await?;
        Ok(())
    }

    async fn flush(&mut self) -> TransportResult<()> {
        self.writer.flush().await?;
        Ok(())
    }
}

/// Reads frames written by [`StreamFrameSink`].
#[derive(Debug)]
pub struct FrameReader<R: AsyncRead + Unpin> {
    reader: R,
}

pub type TcpFrameReader = FrameReader<TcpStream>;

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Next frame, or `None` when the stream ends between frames.
    pub async fn read_frame(&mut self) -> TransportResult<Option<Frame>> {
        let mut header = [0u8; 5];
        match self.reader.read_exact(&mut header).await {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err.into()),
        }

        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge { len });
        }
        let more = match header[4] {
            0 => false,
            1 => true,
            flag => return Err(TransportError::InvalidFlag { flag }),
        };

        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload).await?;
        Ok(Some(Frame {
            payload: Bytes::from(payload),
            more,
        }))
    }

    /// Frames of the next task, up to and including the one without the
    /// more flag.
    pub async fn read_task_frames(&mut self) -> TransportResult<Option<Vec<Bytes>>> {
        let mut frames = Vec::new();
        loop {
            match self.read_frame().await? {
                Some(frame) => {
                    frames.push(frame.payload);
                    if !frame.more {
                        return Ok(Some(frames));
                    }
                }
                None if frames.is_empty() => return Ok(None),
                None => return Err(TransportError::UnexpectedEof),
            }
        }
    }

    pub async fn read_task(&mut self) -> TransportResult<Option<AnnotationTask>> {
        match self.read_task_frames().await? {
            Some(frames) => Ok(Some(decode_task(&frames)?)),
            None => Ok(None),
        }
    }
}

/// In-process sink; frames arrive on the paired receiver.
#[derive(Debug, Clone)]
pub struct ChannelFrameSink {
    tx: UnboundedSender<Frame>,
}

impl ChannelFrameSink {
    pub fn channel() -> (Self, UnboundedReceiver<Frame>) {
        let (tx, rx) = unbounded_channel::<Frame>();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl FrameSink for ChannelFrameSink {
    async fn send(&mut self, frame: Bytes, more: bool) -> TransportResult<()> {
        self.tx
            .send(Frame {
                payload: frame,
                more,
            })
            .map_err(|_| TransportError::Closed)
    }
}
