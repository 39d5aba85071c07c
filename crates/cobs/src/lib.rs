//! Consistent Overhead Byte Stuffing (COBS) framing
//!
//! Turns packets into zero-terminated frames and back again. COBS rewrites a
//! packet so that the sentinel value `0x00` never appears inside it, which
//! lets a single `0x00` byte mark the end of every frame on an otherwise
//! featureless byte stream. [`encode`] and [`decode`] work on whole packets;
//! a [`Packetiser`] sits in front of [`decode`] and cuts an arbitrarily
//! chunked stream into complete frames at each sentinel.
//!
//! Based on **Consistent Overhead Byte Stuffing**, Stuart Cheshire and Mary
//! Baker, IEEE/ACM TRANSACTIONS ON NETWORKING, VOL.7, NO. 2, APRIL 1999.
//! Available from <http://www.stuartcheshire.org/papers/COBSforToN.pdf>
//!

use std::fmt;
use std::mem;


/// Sentinel value marking the end of each frame (interpacket marker)
pub const SENTINEL: u8 = 0;

/// Maximum length in wire bytes of a single frame held by a [`Packetiser`]
pub const MAX_PACKET_LEN: usize = 1024;

// Longest run of non-sentinel bytes a single run marker can describe
const MAX_RUN: u8 = 254;

/// Errors from use of this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CobsError {
    /// A sentinel turned up in the middle of an encoded run
    UnexpectedZero,
    /// The receive buffer cannot take any more bytes
    BufferFull,
    /// The data finished before the frame did
    Incomplete,
}

impl fmt::Display for CobsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CobsError::UnexpectedZero => write!(f, "Zero byte inside an encoded run"),
            CobsError::BufferFull => write!(f, "Receive buffer is full"),
            CobsError::Incomplete => write!(f, "Frame is incomplete"),
        }
    }
}

impl std::error::Error for CobsError {}

/// Worst possible encoded length for a packet of `len` bytes
///
/// One run marker up front, one extra marker per 254 bytes of unbroken
/// non-sentinel data, and the closing sentinel.
pub const fn max_encoded_len(len: usize) -> usize {
    len + 2 + len / MAX_RUN as usize
}

/// Encode a packet into a zero-terminated COBS frame
///
/// The frame is written to `op`, which is cleared first. Runs end at each
/// sentinel in the input (the sentinel is consumed) or after 254 non-sentinel
/// bytes (nothing is consumed and a fresh run is opened). Encoding cannot
/// fail; the result is at worst [`max_encoded_len`] bytes and always finishes
/// with the single terminating sentinel.
///
/// # Example
/// ```
/// let mut frame = Vec::new();
/// cobs::encode(&[0x11, 0x22, 0x00, 0x33], &mut frame);
/// assert_eq!(frame, [0x03, 0x11, 0x22, 0x02, 0x33, 0x00]);
/// ```
pub fn encode(raw: &[u8], op: &mut Vec<u8>) {
    op.clear();
    op.reserve(max_encoded_len(raw.len()));

    /* Position of the marker byte for the currently open run, and how many
     * data bytes that run holds so far. The marker is pushed as a sentinel
     * placeholder and overwritten once the run closes. */
    let mut mark = 0;
    let mut run = 0u8;
    op.push(SENTINEL);

    for &byte in raw {
        if byte == SENTINEL {
            op[mark] = run + 1;
            mark = op.len();
            op.push(SENTINEL);
            run = 0;
        } else {
            op.push(byte);
            run += 1;
            if run == MAX_RUN {
                /* Run at full stretch - close it without consuming anything */
                op[mark] = 0xFF;
                mark = op.len();
                op.push(SENTINEL);
                run = 0;
            }
        }
    }

    op[mark] = run + 1;
    op.push(SENTINEL);
}

/// Decode one COBS frame
///
/// `encoded` holds a single frame, with or without its terminating sentinel;
/// anything beyond the terminator is ignored. The decoded packet is written
/// to `op`, which is cleared first.
///
/// # Errors
/// [`CobsError::UnexpectedZero`] if a sentinel appears inside a run, and
/// [`CobsError::Incomplete`] if the data stops part way through one.
///
/// # Example
/// ```
/// let mut packet = Vec::new();
/// cobs::decode(&[0x03, 0x11, 0x22, 0x02, 0x33, 0x00], &mut packet).unwrap();
/// assert_eq!(packet, [0x11, 0x22, 0x00, 0x33]);
/// ```
pub fn decode(encoded: &[u8], op: &mut Vec<u8>) -> Result<(), CobsError> {
    op.clear();
    let mut pos = 0;

    while pos < encoded.len() {
        let marker = encoded[pos];
        pos += 1;

        for _ in 1..marker {
            match encoded.get(pos) {
                None => return Err(CobsError::Incomplete),
                Some(&SENTINEL) => return Err(CobsError::UnexpectedZero),
                Some(&byte) => op.push(byte),
            }
            pos += 1;
        }

        match encoded.get(pos) {
            /* The terminator; bytes beyond it belong to nobody */
            Some(&SENTINEL) | None => return Ok(()),
            /* A sentinel was consumed here unless the run was at full
             * stretch, in which case the marker carries no implicit zero */
            Some(_) if marker < 0xFF => op.push(SENTINEL),
            Some(_) => (),
        }
    }
    Ok(())
}

/// Statistics maintained by a [`Packetiser`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PacketiserStats {
    /// Number of bytes of input accepted from the source
    pub inbytes: u64,
    /// Number of complete frames handed to the layer above
    pub frames: u64,
    /// Number of times a byte arrived with the buffer already full
    pub overflows: u64,
    /// Number of partial frames discarded (reject-incomplete builds only)
    pub dropped: u64,
}

/// Cuts an arbitrarily chunked byte stream into complete frames
///
/// Bytes are accumulated into a bounded buffer until a [`SENTINEL`] arrives,
/// at which point the whole frame (terminator included) is handed back and
/// the buffer cleared. Chunk boundaries are arbitrary - a UART interrupt
/// hands over whatever it has - so a frame may take several calls to
/// assemble, and one chunk may hold several frames.
///
/// # Example
/// ```
/// use cobs::Packetiser;
/// let mut packetiser = Packetiser::new();
/// let (frame, leftover) = packetiser.feed(&[0x02, 0x11, 0x00, 0x02]).unwrap();
/// assert_eq!(frame.unwrap(), [0x02, 0x11, 0x00]);
/// assert_eq!(leftover, [0x02]);
/// ```
#[derive(Debug, Default)]
pub struct Packetiser {
    buffer: Vec<u8>,
    stats: PacketiserStats,
}

impl Packetiser {
    /// Create a new instance with an empty buffer and zero'ed statistics
    pub fn new() -> Packetiser {
        Packetiser {
            buffer: Vec::with_capacity(MAX_PACKET_LEN),
            stats: PacketiserStats::default(),
        }
    }

    /// Return statistics representing the behaviour of this packetiser
    pub fn stats(&self) -> &PacketiserStats {
        &self.stats
    }

    /// Number of bytes of partial frame currently held
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feed a chunk of stream into the packetiser
    ///
    /// Walks the chunk byte by byte. When a sentinel completes a frame, the
    /// frame and the unconsumed remainder of the chunk are returned so the
    /// caller can process the frame and feed the leftover back in. A chunk
    /// that ends mid-frame returns no frame and the partial data is retained
    /// for the next call - unless the `reject-incomplete` feature is on, in
    /// which case the partial frame is dropped and an error reported.
    ///
    /// # Errors
    /// [`CobsError::BufferFull`] when a byte arrives that would overflow the
    /// buffer (the buffer is left as it stands), and
    /// [`CobsError::Incomplete`] on partial frames in reject-incomplete
    /// builds.
    pub fn feed<'a>(&mut self, chunk: &'a [u8]) -> Result<(Option<Vec<u8>>, &'a [u8]), CobsError> {
        for (at, &byte) in chunk.iter().enumerate() {
            if self.buffer.len() >= MAX_PACKET_LEN {
                self.stats.overflows += 1;
                return Err(CobsError::BufferFull);
            }
            self.buffer.push(byte);
            self.stats.inbytes += 1;

            if byte == SENTINEL {
                /* Frame complete, terminator and all; ownership moves out */
                let frame = mem::take(&mut self.buffer);
                self.buffer.reserve(MAX_PACKET_LEN);
                self.stats.frames += 1;
                return Ok((Some(frame), &chunk[at + 1..]));
            }
        }

        if cfg!(feature = "reject-incomplete") && !self.buffer.is_empty() {
            self.buffer.clear();
            self.stats.dropped += 1;
            return Err(CobsError::Incomplete);
        }
        Ok((None, &[]))
    }
}
