//! Shared networking constants and helpers used by client and server.
//!
//! Wire format: once per connection the server sends `HEADER_LEN` header bytes, then an
//! endless sequence of fixed-size frames. Frame content carries no meaning; only the
//! size is part of the contract.
use std::io::{ErrorKind, Read};
use std::net::{IpAddr, Ipv4Addr};

use crate::error::StreamError;
use crate::result::Result;

/// Loopback address the server listens on unless configured otherwise.
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
/// TCP port for the quote stream.
pub const DEFAULT_PORT: u16 = 10003;
/// Number of header bytes written once per connection.
pub const HEADER_LEN: usize = 1;
/// Size of one quote frame in bytes.
pub const DEFAULT_FRAME_SIZE: usize = 512;

/// Helper to format an address with a port like "ip:port".
pub fn addr(ip: &str, port: u16) -> String {
    format!("{}:{}", ip, port)
}

/// Read the per-connection header byte.
pub fn read_header<R: Read>(reader: &mut R) -> Result<u8> {
    let mut header = [0u8; HEADER_LEN];
    read_exact_or_disconnect(reader, &mut header)?;
    Ok(header[0])
}

/// Read exactly one frame into `buf`; the frame size is `buf.len()`.
pub fn read_frame<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    read_exact_or_disconnect(reader, buf)
}

fn read_exact_or_disconnect<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => StreamError::Disconnected,
        _ => StreamError::Io(e),
    })
}
