//! Opening the byte stream behind an [`OutputTarget`]

use super::shared::BoxedWriter;
use super::target::OutputTarget;
use log::debug;
use std::fs::File;
use std::io::{self, BufWriter};
use std::net::TcpStream;
use std::path::Path;

/// Open `target` for writing.
///
/// Files are created or truncated, pipes are duplicated from an inherited
/// descriptor, TCP targets are connected with Nagle disabled.
pub fn open(target: &OutputTarget) -> io::Result<BoxedWriter> {
    match target {
        OutputTarget::File(path) => open_file(path),
        OutputTarget::Pipe(fd) => open_pipe(*fd),
        OutputTarget::Tcp { host, port } => open_tcp(host, *port),
    }
}

fn open_file(path: &Path) -> io::Result<BoxedWriter> {
    let file = File::create(path)?;
    debug!("Created {}", path.display());
    Ok(Box::new(BufWriter::new(file)))
}

#[cfg(unix)]
fn open_pipe(fd: i32) -> io::Result<BoxedWriter> {
    use std::os::fd::BorrowedFd;

    // SAFETY: the descriptor is only borrowed for the duration of the
    // duplication; an invalid one makes the dup fail with EBADF.
    let owned = unsafe { BorrowedFd::borrow_raw(fd) }.try_clone_to_owned()?;
    debug!("Duplicated pipe descriptor {fd}");
    Ok(Box::new(File::from(owned)))
}

#[cfg(not(unix))]
fn open_pipe(fd: i32) -> io::Result<BoxedWriter> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("pipe://{fd} is only available on unix"),
    ))
}

fn open_tcp(host: &str, port: u16) -> io::Result<BoxedWriter> {
    let stream = TcpStream::connect((host, port))?;
    stream.set_nodelay(true)?;
    debug!("Connected to {}", stream.peer_addr()?);
    Ok(Box::new(stream))
}
