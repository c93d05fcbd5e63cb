use std::fs::File;
use std::net::Shutdown;
use std::os::fd::{FromRawFd, OwnedFd};
use std::os::unix::net::UnixStream;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::IpcStream;

/// Which kind of byte stream backs a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportKind {
    /// Anonymous pipe from `pipe(2)`.
    #[default]
    Pipe,
    /// Connected `AF_UNIX` stream pair, used one-way.
    UnixPair,
}

impl TransportKind {
    /// Open a fresh `(reader, writer)` endpoint pair of this kind.
    pub fn open(self) -> Result<(IpcStream, IpcStream)> {
        match self {
            TransportKind::Pipe => pipe(),
            TransportKind::UnixPair => unix_pair(),
        }
    }

    /// Transport name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            TransportKind::Pipe => "pipe",
            TransportKind::UnixPair => "unix-pair",
        }
    }
}

/// Create an anonymous pipe and return its `(reader, writer)` ends.
///
/// Both descriptors are marked close-on-exec.
pub fn pipe() -> Result<(IpcStream, IpcStream)> {
    let mut fds = [0 as libc::c_int; 2];

    // SAFETY: `fds` is a valid, writable array of two c_ints as pipe(2) requires.
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(TransportError::Create {
            kind: "pipe",
            source: std::io::Error::last_os_error(),
        });
    }

    // SAFETY: pipe(2) succeeded, so both descriptors are open and owned by us
    // alone; wrapping them transfers that ownership exactly once.
    let (read_fd, write_fd) =
        unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

    set_cloexec(&read_fd)?;
    set_cloexec(&write_fd)?;

    debug!(read_fd = fds[0], write_fd = fds[1], "created pipe");
    Ok((
        IpcStream::from_pipe(File::from(read_fd)),
        IpcStream::from_pipe(File::from(write_fd)),
    ))
}

/// Create a connected Unix stream pair and return `(reader, writer)`.
///
/// The unused direction is shut down on each end so the pair behaves like a
/// pipe: the writer cannot read and the reader cannot write.
pub fn unix_pair() -> Result<(IpcStream, IpcStream)> {
    let (writer, reader) = UnixStream::pair().map_err(|e| TransportError::Create {
        kind: "unix-pair",
        source: e,
    })?;
    writer.shutdown(Shutdown::Read)?;
    reader.shutdown(Shutdown::Write)?;

    debug!("created unix stream pair");
    Ok((IpcStream::from_unix(reader), IpcStream::from_unix(writer)))
}

fn set_cloexec(fd: &OwnedFd) -> Result<()> {
    use std::os::fd::AsRawFd;

    let raw = fd.as_raw_fd();
    // SAFETY: `raw` is an open descriptor borrowed from `fd` for the duration of the calls.
    let rc = unsafe {
        let flags = libc::fcntl(raw, libc::F_GETFD);
        if flags < 0 {
            flags
        } else {
            libc::fcntl(raw, libc::F_SETFD, flags | libc::FD_CLOEXEC)
        }
    };
    if rc < 0 {
        return Err(TransportError::Create {
            kind: "pipe",
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn test_pipe_carries_bytes() {
        let (mut reader, mut writer) = pipe().unwrap();
        writer.write_all(b"hello").unwrap();

        let mut buf = [0u8; 5];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(reader.kind(), "pipe");
    }

    #[test]
    fn test_pipe_eof_after_writer_dropped() {
        let (mut reader, mut writer) = pipe().unwrap();
        writer.write_all(b"x").unwrap();
        drop(writer);

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"x");
    }

    #[test]
    fn test_pipe_rejects_timeouts() {
        let (reader, writer) = pipe().unwrap();
        assert!(reader.set_read_timeout(None).is_ok());
        let result = reader.set_read_timeout(Some(std::time::Duration::from_millis(5)));
        assert!(matches!(result, Err(TransportError::Unsupported { .. })));
        let result = writer.set_write_timeout(Some(std::time::Duration::from_millis(5)));
        assert!(matches!(result, Err(TransportError::Unsupported { .. })));
    }

    #[test]
    fn test_unix_pair_is_one_way() {
        let (mut reader, mut writer) = unix_pair().unwrap();
        writer.write_all(b"down").unwrap();

        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"down");

        assert!(reader.write_all(b"up").is_err());
        assert_eq!(writer.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_unix_pair_eof_after_writer_dropped() {
        let (mut reader, writer) = unix_pair().unwrap();
        drop(writer);

        let mut buf = [0u8; 1];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_clone_keeps_pipe_open() {
        let (mut reader, writer) = pipe().unwrap();
        let mut clone = writer.try_clone().unwrap();
        drop(writer);

        clone.write_all(b"still-open").unwrap();
        let mut buf = [0u8; 10];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"still-open");
    }

    #[test]
    fn test_transport_kind_open() {
        for kind in [TransportKind::Pipe, TransportKind::UnixPair] {
            let (mut reader, mut writer) = kind.open().unwrap();
            writer.write_all(kind.name().as_bytes()).unwrap();
            drop(writer);
            let mut text = String::new();
            reader.read_to_string(&mut text).unwrap();
            assert_eq!(text, kind.name());
        }
        assert_eq!(TransportKind::default(), TransportKind::Pipe);
    }
}
