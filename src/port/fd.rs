//! Thin `libc` wrappers around the port descriptor.
//!
//! The port loop needs exactly three things from its descriptor: wait for
//! readiness with a timeout, read what is available, and write a whole
//! buffer. Everything goes through `poll`/`read`/`write` directly so the
//! readiness we observe is the kernel's, with no userspace buffering in
//! between.

use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::time::Duration;

/// Result of waiting on the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The requested event is ready.
    Ready,
    /// The timeout elapsed with nothing ready.
    Timeout,
    /// The descriptor reported an error, hangup or is invalid.
    Hangup(i16),
}

/// An owned, non-blocking port descriptor.
#[derive(Debug)]
pub struct Descriptor {
    fd: OwnedFd,
}

impl Descriptor {
    /// Take ownership of `fd` and switch it to non-blocking mode.
    pub fn new(fd: OwnedFd) -> io::Result<Self> {
        let raw = fd.as_raw_fd();
        // SAFETY: fcntl on a descriptor we own; F_GETFL/F_SETFL take no pointers.
        let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: as above.
        if unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }

    /// Raw descriptor number, for logging.
    pub fn raw(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    fn poll(&self, events: i16, timeout: Duration) -> io::Result<Readiness> {
        let mut pollfd = libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events,
            revents: 0,
        };
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);

        loop {
            // SAFETY: pollfd is a valid, initialized struct and nfds is 1.
            let ready = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
            if ready < 0 {
                let errno = io::Error::last_os_error();
                if errno.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(errno);
            }
            if ready == 0 {
                return Ok(Readiness::Timeout);
            }
            // Input still pending alongside a hangup is drained first.
            if pollfd.revents & events != 0 {
                return Ok(Readiness::Ready);
            }
            if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                return Ok(Readiness::Hangup(pollfd.revents));
            }
            return Ok(Readiness::Timeout);
        }
    }

    /// Wait up to `timeout` for input.
    pub fn wait_readable(&self, timeout: Duration) -> io::Result<Readiness> {
        self.poll(libc::POLLIN, timeout)
    }

    /// Wait up to `timeout` for room to write.
    pub fn wait_writable(&self, timeout: Duration) -> io::Result<Readiness> {
        self.poll(libc::POLLOUT, timeout)
    }

    /// Read what is available into `buf`.
    ///
    /// `Ok(0)` means end of stream. `WouldBlock` and `Interrupted` are
    /// returned to the caller unchanged.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: buf is a valid writable region of buf.len() bytes.
        let n = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    /// Write all of `data`, polling for writability between partial writes.
    ///
    /// A poll timeout just retries; only a descriptor error ends the write.
    pub fn write_all(&self, mut data: &[u8], timeout: Duration) -> io::Result<()> {
        while !data.is_empty() {
            match self.wait_writable(timeout)? {
                Readiness::Timeout => continue,
                Readiness::Hangup(revents) => {
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        format!("descriptor hung up during write (revents=0x{revents:x})"),
                    ));
                }
                Readiness::Ready => {}
            }
            // SAFETY: data is a valid readable region of data.len() bytes.
            let n = unsafe {
                libc::write(
                    self.fd.as_raw_fd(),
                    data.as_ptr().cast::<libc::c_void>(),
                    data.len(),
                )
            };
            if n < 0 {
                let errno = io::Error::last_os_error();
                if matches!(
                    errno.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                ) {
                    continue;
                }
                return Err(errno);
            }
            data = &data[n as usize..];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;

    fn pair() -> (Descriptor, UnixStream) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        (Descriptor::new(OwnedFd::from(ours)).unwrap(), theirs)
    }

    #[test]
    fn idle_descriptor_times_out() {
        let (desc, _peer) = pair();
        assert_eq!(
            desc.wait_readable(Duration::from_millis(5)).unwrap(),
            Readiness::Timeout
        );
    }

    #[test]
    fn read_sees_peer_bytes() {
        let (desc, mut peer) = pair();
        peer.write_all(b"\r\nOK\r\n").unwrap();
        assert_eq!(
            desc.wait_readable(Duration::from_secs(1)).unwrap(),
            Readiness::Ready
        );
        let mut buf = [0u8; 16];
        let n = desc.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"\r\nOK\r\n");
    }

    #[test]
    fn empty_read_is_would_block() {
        let (desc, _peer) = pair();
        let mut buf = [0u8; 4];
        let err = desc.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn closed_peer_reports_eof_or_hangup() {
        let (desc, peer) = pair();
        drop(peer);
        let readiness = desc.wait_readable(Duration::from_secs(1)).unwrap();
        assert_ne!(readiness, Readiness::Timeout);
        if readiness == Readiness::Ready {
            let mut buf = [0u8; 4];
            assert_eq!(desc.read(&mut buf).unwrap(), 0);
        }
    }

    #[test]
    fn write_all_delivers_every_byte() {
        let (desc, mut peer) = pair();
        let payload = vec![0x5au8; 64 * 1024];
        let reader = std::thread::spawn(move || {
            let mut got = vec![0u8; 64 * 1024];
            peer.read_exact(&mut got).unwrap();
            got
        });
        desc.write_all(&payload, Duration::from_millis(10)).unwrap();
        assert_eq!(reader.join().unwrap(), payload);
    }
}
