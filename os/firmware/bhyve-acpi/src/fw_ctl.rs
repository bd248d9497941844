//! # bhyve fwctl Channel
//!
//! bhyve's native firmware control interface, used when no fw_cfg device is
//! present. It shares the fw_cfg ports. A probe writes key `0` to the selector
//! port and expects `"BHYV"` on the data port; after that every exchange is a
//! sequence of little-endian 32-bit words on port `0x510`:
//!
//! ```text
//! request   size | op | txid | payload (NUL-terminated name, zero-padded)
//! response  size | op | txid | err | data[size - 16]
//! ```
//!
//! `size` counts the header and the padded payload. For [`OP_GET`] the response
//! data is the value size as a `u64` followed by the value itself.

use log::{debug, warn};

use crate::port::{FW_CFG_DATA_PORT, FW_CFG_SELECTOR_PORT, PortIo};

pub const OP_GET: u32 = 3;

/// First transaction ID of a session.
pub const INITIAL_TXID: u32 = 0xA5;

const SIGNATURE: [u8; 4] = *b"BHYV";
const TX_HEADER_WORDS: usize = 3;
const RX_HEADER_SIZE: u32 = 16;
const WORD: usize = size_of::<u32>();

const ERR_NOT_FOUND: u32 = 2;
const ERR_INVALID: u32 = 7;
const ERR_BUFFER_TOO_SMALL: u32 = 40;

/// Longest name that can be sent; keeps the request size within a `u32`.
pub const MAX_NAME_LEN: usize = 1024;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FwCtlError {
    #[error("fwctl interface not present")]
    Unavailable,
    #[error("fwctl key not found")]
    NotFound,
    #[error("fwctl rejected the request as invalid")]
    InvalidParameter,
    #[error("fwctl value needs {needed} bytes")]
    BufferTooSmall { needed: usize },
    #[error("fwctl request failed with error {code}")]
    Unsupported { code: u32 },
    #[error("fwctl response header out of sequence")]
    Malformed,
}

/// Key/value configuration channel.
pub trait FirmwareControl {
    /// Copy the value stored under `name` into `buf` and return its size.
    ///
    /// # Errors
    /// [`FwCtlError::BufferTooSmall`] if `buf` is shorter than the value; any
    /// other variant if the channel is absent or refuses the request.
    fn get(&mut self, name: &str, buf: &mut [u8]) -> Result<usize, FwCtlError>;
}

impl<T: FirmwareControl + ?Sized> FirmwareControl for &mut T {
    fn get(&mut self, name: &str, buf: &mut [u8]) -> Result<usize, FwCtlError> {
        (**self).get(name, buf)
    }
}

/// Placeholder for a platform without fwctl.
#[derive(Debug, Copy, Clone, Default)]
pub struct NoFwCtl;

impl FirmwareControl for NoFwCtl {
    fn get(&mut self, _name: &str, _buf: &mut [u8]) -> Result<usize, FwCtlError> {
        Err(FwCtlError::Unavailable)
    }
}

/// The fwctl device behind the legacy I/O ports.
pub struct BhyveFwCtl<P> {
    ports: P,
    available: Option<bool>,
    txid: u32,
}

struct Response {
    /// Data bytes still waiting on the port.
    remaining: usize,
}

impl<P: PortIo> BhyveFwCtl<P> {
    #[must_use]
    pub const fn new(ports: P) -> Self {
        Self {
            ports,
            available: None,
            txid: INITIAL_TXID,
        }
    }

    pub fn is_available(&mut self) -> bool {
        if let Some(available) = self.available {
            return available;
        }

        self.ports.write_u16(FW_CFG_SELECTOR_PORT, 0);
        let mut signature = [0u8; 4];
        for byte in &mut signature {
            *byte = self.ports.read_u8(FW_CFG_DATA_PORT);
        }
        let available = signature == SIGNATURE;
        debug!("fwctl signature {signature:02x?}, available: {available}");
        self.available = Some(available);
        available
    }

    #[must_use]
    pub const fn txid(&self) -> u32 {
        self.txid
    }

    #[must_use]
    pub fn into_inner(self) -> P {
        self.ports
    }

    /// Send one request and read the response header.
    fn transact(&mut self, op: u32, name: &str) -> Result<Response, FwCtlError> {
        if !self.is_available() {
            return Err(FwCtlError::Unavailable);
        }
        if name.is_empty() || name.len() > MAX_NAME_LEN || name.as_bytes().contains(&0) {
            return Err(FwCtlError::InvalidParameter);
        }

        let txid = self.txid;
        self.txid = self.txid.wrapping_add(1);

        // Name plus terminator, in whole words.
        let payload_words = (name.len() + 1).div_ceil(WORD);
        let size = (TX_HEADER_WORDS + payload_words) * WORD;
        let size = u32::try_from(size).map_err(|_| FwCtlError::InvalidParameter)?;

        self.ports.write_u32(FW_CFG_SELECTOR_PORT, size);
        self.ports.write_u32(FW_CFG_SELECTOR_PORT, op);
        self.ports.write_u32(FW_CFG_SELECTOR_PORT, txid);
        for index in 0..payload_words {
            let mut word = [0u8; WORD];
            for (slot, byte) in word
                .iter_mut()
                .zip(name.as_bytes().iter().skip(index * WORD))
            {
                *slot = *byte;
            }
            self.ports
                .write_u32(FW_CFG_SELECTOR_PORT, u32::from_le_bytes(word));
        }

        let rx_size = self.ports.read_u32(FW_CFG_SELECTOR_PORT);
        let rx_op = self.ports.read_u32(FW_CFG_SELECTOR_PORT);
        let rx_txid = self.ports.read_u32(FW_CFG_SELECTOR_PORT);
        let err = self.ports.read_u32(FW_CFG_SELECTOR_PORT);

        let remaining = usize::try_from(rx_size.saturating_sub(RX_HEADER_SIZE)).unwrap_or(0);
        if rx_size < RX_HEADER_SIZE || rx_op != op || rx_txid != txid {
            warn!("fwctl response {rx_op}/{rx_txid:#x} does not match request {op}/{txid:#x}");
            self.drain(remaining);
            return Err(FwCtlError::Malformed);
        }

        if err != 0 {
            self.drain(remaining);
            return Err(match err {
                ERR_NOT_FOUND => FwCtlError::NotFound,
                ERR_INVALID => FwCtlError::InvalidParameter,
                ERR_BUFFER_TOO_SMALL => FwCtlError::BufferTooSmall { needed: 0 },
                code => FwCtlError::Unsupported { code },
            });
        }

        Ok(Response { remaining })
    }

    /// Discard `bytes` of response data, rounded up to whole words.
    fn drain(&mut self, bytes: usize) {
        for _ in 0..bytes.div_ceil(WORD) {
            let _ = self.ports.read_u32(FW_CFG_SELECTOR_PORT);
        }
    }
}

impl<P: PortIo> FirmwareControl for BhyveFwCtl<P> {
    fn get(&mut self, name: &str, buf: &mut [u8]) -> Result<usize, FwCtlError> {
        let response = self.transact(OP_GET, name)?;
        let mut remaining = response.remaining;
        if remaining < 2 * WORD {
            self.drain(remaining);
            return Err(FwCtlError::Malformed);
        }

        let low = self.ports.read_u32(FW_CFG_SELECTOR_PORT);
        let high = self.ports.read_u32(FW_CFG_SELECTOR_PORT);
        remaining -= 2 * WORD;
        let value_size = (u64::from(high) << 32) | u64::from(low);
        let value_size = usize::try_from(value_size).unwrap_or(usize::MAX);

        if value_size > buf.len() {
            self.drain(remaining);
            return Err(FwCtlError::BufferTooSmall { needed: value_size });
        }

        let mut copied = 0;
        while copied < value_size && remaining >= WORD {
            let word = self.ports.read_u32(FW_CFG_SELECTOR_PORT).to_le_bytes();
            remaining -= WORD;
            let take = WORD.min(value_size - copied);
            buf[copied..copied + take].copy_from_slice(&word[..take]);
            copied += take;
        }

        if remaining > 0 {
            debug!("fwctl draining {remaining} surplus response bytes");
            self.drain(remaining);
        }

        if copied < value_size {
            return Err(FwCtlError::Malformed);
        }
        Ok(value_size)
    }
}
