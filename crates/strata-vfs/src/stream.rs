//! Tokio I/O adapter for [`FileHandle`].
//!
//! [`FileStream`] owns a handle and drives one handle operation at a time
//! as a boxed future, so VFS files can be passed to anything that takes
//! `AsyncRead`, `AsyncWrite` or `AsyncSeek` (`tokio::io::copy`, codecs,
//! decoders).

use std::fmt;
use std::future::Future;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};

use crate::error::VfsError;
use crate::handle::FileHandle;
use crate::types::SeekOrigin;

type Op = Pin<Box<dyn Future<Output = (FileHandle, OpResult)> + Send>>;

enum OpResult {
    Read(Result<Vec<u8>, VfsError>),
    Write(Result<usize, VfsError>),
    Seek(Result<u64, VfsError>),
    Close(Result<(), VfsError>),
}

enum State {
    Idle(FileHandle),
    Busy(Op),
    /// Only seen if an operation future panicked.
    Poisoned,
}

/// A [`FileHandle`] usable through tokio's I/O traits.
///
/// Reads advance the handle's cursor; bytes a read produced beyond the
/// caller's buffer are kept and served first by the next read.
/// `poll_flush` waits for the operation in flight and `poll_shutdown`
/// closes the handle.
pub struct FileStream {
    state: State,
    buffered: Vec<u8>,
}

impl fmt::Debug for FileStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("FileStream");
        match &self.state {
            State::Idle(handle) => s.field("handle", handle),
            State::Busy(_) => s.field("handle", &"<busy>"),
            State::Poisoned => s.field("handle", &"<poisoned>"),
        };
        s.field("buffered", &self.buffered.len()).finish()
    }
}

impl FileHandle {
    /// Wrap this handle for use with tokio's I/O traits.
    pub fn into_stream(self) -> FileStream {
        FileStream {
            state: State::Idle(self),
            buffered: Vec::new(),
        }
    }
}

impl FileStream {
    /// Get the handle back, with its cursor at the stream position.
    ///
    /// Fails with the stream itself while an operation is in flight.
    pub fn into_inner(mut self) -> Result<FileHandle, Self> {
        match std::mem::replace(&mut self.state, State::Poisoned) {
            State::Idle(mut handle) => {
                handle.unread(self.buffered.len() as u64);
                Ok(handle)
            }
            state => {
                self.state = state;
                Err(self)
            }
        }
    }

    /// Poll the operation in flight. `None` means nothing was pending.
    fn poll_op(&mut self, cx: &mut Context<'_>) -> Poll<Option<OpResult>> {
        let State::Busy(op) = &mut self.state else {
            return Poll::Ready(None);
        };
        let (handle, result) = ready!(op.as_mut().poll(cx));
        self.state = State::Idle(handle);
        Poll::Ready(Some(result))
    }

    /// Hand the idle handle to a new operation.
    fn start(&mut self, op: impl FnOnce(FileHandle) -> Op) -> io::Result<()> {
        match std::mem::replace(&mut self.state, State::Poisoned) {
            State::Idle(mut handle) => {
                // Anything other than a read starts at the logical position
                if !self.buffered.is_empty() {
                    handle.unread(self.buffered.len() as u64);
                    self.buffered.clear();
                }
                self.state = State::Busy(op(handle));
                Ok(())
            }
            State::Busy(op) => {
                self.state = State::Busy(op);
                Err(io::Error::other("another operation is in progress"))
            }
            State::Poisoned => Err(poisoned()),
        }
    }

    /// Absorb the result of an operation a different call started.
    fn settle(&mut self, result: OpResult) -> io::Result<()> {
        match result {
            OpResult::Read(Ok(data)) => {
                self.buffered = data;
                Ok(())
            }
            OpResult::Read(Err(VfsError::EndOfStream)) => Ok(()),
            OpResult::Read(Err(e))
            | OpResult::Write(Err(e))
            | OpResult::Seek(Err(e))
            | OpResult::Close(Err(e)) => Err(e.into()),
            OpResult::Write(Ok(_)) | OpResult::Seek(Ok(_)) | OpResult::Close(Ok(())) => Ok(()),
        }
    }

    fn drain_buffered(&mut self, buf: &mut ReadBuf<'_>) {
        let n = self.buffered.len().min(buf.remaining());
        buf.put_slice(&self.buffered[..n]);
        self.buffered.drain(..n);
    }

    fn position(&self) -> io::Result<u64> {
        match &self.state {
            State::Idle(handle) => Ok(handle.tell()? - self.buffered.len() as u64),
            State::Busy(_) => Err(io::Error::other("another operation is in progress")),
            State::Poisoned => Err(poisoned()),
        }
    }
}

fn poisoned() -> io::Error {
    io::Error::other("file stream poisoned by a panicked operation")
}

fn read_op(mut handle: FileHandle, len: usize) -> Op {
    Box::pin(async move {
        let mut data = vec![0u8; len];
        let result = handle.read(&mut data).await.map(|n| {
            data.truncate(n);
            data
        });
        (handle, OpResult::Read(result))
    })
}

fn write_op(mut handle: FileHandle, data: Vec<u8>) -> Op {
    Box::pin(async move {
        let result = handle.write(&data).await;
        (handle, OpResult::Write(result))
    })
}

fn seek_op(mut handle: FileHandle, offset: i64, origin: SeekOrigin) -> Op {
    Box::pin(async move {
        let result = handle.seek(offset, origin).await;
        (handle, OpResult::Seek(result))
    })
}

fn close_op(mut handle: FileHandle) -> Op {
    Box::pin(async move {
        let result = handle.close().await;
        (handle, OpResult::Close(result))
    })
}

impl AsyncRead for FileStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        if !this.buffered.is_empty() {
            this.drain_buffered(buf);
            return Poll::Ready(Ok(()));
        }

        loop {
            match ready!(this.poll_op(cx)) {
                Some(OpResult::Read(Ok(data))) => {
                    this.buffered = data;
                    this.drain_buffered(buf);
                    return Poll::Ready(Ok(()));
                }
                // Nothing filled signals end of file
                Some(OpResult::Read(Err(VfsError::EndOfStream))) => return Poll::Ready(Ok(())),
                Some(OpResult::Read(Err(e))) => return Poll::Ready(Err(e.into())),
                Some(other) => this.settle(other)?,
                None => {
                    let len = buf.remaining();
                    this.start(|handle| read_op(handle, len))?;
                }
            }
        }
    }
}

impl AsyncWrite for FileStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        loop {
            match ready!(this.poll_op(cx)) {
                Some(OpResult::Write(result)) => return Poll::Ready(result.map_err(Into::into)),
                Some(other) => this.settle(other)?,
                None if data.is_empty() => return Poll::Ready(Ok(0)),
                None => {
                    let data = data.to_vec();
                    this.start(|handle| write_op(handle, data))?;
                }
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        while let Some(result) = ready!(this.poll_op(cx)) {
            this.settle(result)?;
        }
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            match ready!(this.poll_op(cx)) {
                Some(OpResult::Close(result)) => return Poll::Ready(result.map_err(Into::into)),
                Some(other) => this.settle(other)?,
                None => {
                    if let State::Idle(handle) = &this.state {
                        if handle.is_closed() {
                            return Poll::Ready(Ok(()));
                        }
                    }
                    this.start(close_op)?;
                }
            }
        }
    }
}

impl AsyncSeek for FileStream {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let this = self.get_mut();
        let (offset, origin) = match position {
            SeekFrom::Start(n) => {
                let offset = i64::try_from(n).map_err(|_| VfsError::OutOfRange(i128::from(n)))?;
                (offset, SeekOrigin::Start)
            }
            SeekFrom::Current(n) => (n, SeekOrigin::Current),
            SeekFrom::End(n) => (n, SeekOrigin::End),
        };
        this.start(|handle| seek_op(handle, offset, origin))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        let this = self.get_mut();
        loop {
            match ready!(this.poll_op(cx)) {
                Some(OpResult::Seek(result)) => return Poll::Ready(result.map_err(Into::into)),
                Some(other) => this.settle(other)?,
                None => return Poll::Ready(this.position()),
            }
        }
    }
}
