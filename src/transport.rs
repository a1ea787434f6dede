//! Byte transports: exact-read source / append sink, plus the optional
//! direct-buffer capability the accelerated path needs.

use crate::codec::CodecError;
use std::io::{Read, Write};

/// Raw byte source/sink under a protocol. Direct-buffer access is an
/// optional capability: in-memory transports expose their buffers, stream
/// transports do not and force the generic codec path.
pub trait Transport {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), CodecError>;

    fn read_byte(&mut self) -> Result<u8, CodecError> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), CodecError>;

    /// Bytes left to read, when the transport knows. Used to reject length
    /// prefixes that overrun the buffer before allocating.
    fn remaining(&self) -> Option<usize> {
        None
    }

    /// Direct read capability: the unread bytes as one slice.
    fn read_slice(&self) -> Option<&[u8]> {
        None
    }

    /// Consume `n` bytes previously obtained through [`Transport::read_slice`].
    fn advance(&mut self, n: usize) {
        let _ = n;
    }

    /// Direct write capability: the output buffer to append to.
    fn write_buf(&mut self) -> Option<&mut Vec<u8>> {
        None
    }
}

/// In-memory transport: writes append, reads consume from the front.
/// Exposes both direct-buffer capabilities.
#[derive(Debug, Default)]
pub struct MemTransport {
    data: Vec<u8>,
    pos: usize,
}

impl MemTransport {
    pub fn new() -> Self {
        MemTransport::default()
    }

    pub fn with_bytes(data: impl Into<Vec<u8>>) -> Self {
        MemTransport {
            data: data.into(),
            pos: 0,
        }
    }

    /// Everything written (or seeded) so far, consumed or not.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}

impl Transport for MemTransport {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), CodecError> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), CodecError> {
        self.data.extend_from_slice(buf);
        Ok(())
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.data.len() - self.pos)
    }

    fn read_slice(&self) -> Option<&[u8]> {
        Some(&self.data[self.pos..])
    }

    fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.data.len());
    }

    fn write_buf(&mut self) -> Option<&mut Vec<u8>> {
        Some(&mut self.data)
    }
}

/// Adapter over arbitrary `std::io` streams. No direct-buffer capability,
/// so codecs over it always take the generic path.
#[derive(Debug)]
pub struct IoTransport<S> {
    stream: S,
}

impl<S> IoTransport<S> {
    pub fn new(stream: S) -> Self {
        IoTransport { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> Transport for IoTransport<S> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), CodecError> {
        self.stream.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                CodecError::UnexpectedEof
            } else {
                CodecError::Io(e)
            }
        })
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), CodecError> {
        self.stream.write_all(buf)?;
        Ok(())
    }
}
