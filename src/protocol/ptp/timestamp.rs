//! PTP timestamp representation and wire conversion.
//!
//! IEEE 1588 carries timestamps as 80 bits: a 48-bit seconds field split into
//! a 16-bit most-significant part and a 32-bit least-significant part,
//! followed by 32-bit nanoseconds. Each part is big-endian on the wire.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ByteOrder};

/// IEEE 1588 PTP timestamp: 48-bit seconds + 32-bit nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PtpTimestamp {
    /// Seconds since the PTP epoch.
    pub seconds: u64,
    /// Nanoseconds within the current second (`0..999_999_999`).
    pub nanoseconds: u32,
}

impl PtpTimestamp {
    /// Wire size in bytes.
    pub const WIRE_SIZE: usize = 10;

    /// Nanoseconds per second.
    pub const NANOS_PER_SEC: u32 = 1_000_000_000;

    /// Maximum seconds representable in 48 bits.
    pub const MAX_SECONDS_48BIT: u64 = (1u64 << 48) - 1;

    /// Zero timestamp.
    pub const ZERO: Self = Self {
        seconds: 0,
        nanoseconds: 0,
    };

    /// Create a new timestamp, clamping nanoseconds to valid range.
    #[must_use]
    pub fn new(seconds: u64, nanoseconds: u32) -> Self {
        Self {
            seconds,
            nanoseconds: nanoseconds.min(Self::NANOS_PER_SEC - 1),
        }
    }

    /// Create a timestamp from the current system time.
    ///
    /// Uses seconds since the Unix epoch as PTP seconds.
    #[must_use]
    pub fn now() -> Self {
        let dur = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Self::from(dur)
    }

    /// Whether both fields are zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.seconds == 0 && self.nanoseconds == 0
    }

    /// Convert to total nanoseconds since epoch.
    #[must_use]
    pub fn to_nanos(&self) -> i128 {
        i128::from(self.seconds) * i128::from(Self::NANOS_PER_SEC) + i128::from(self.nanoseconds)
    }

    /// Create from total nanoseconds since epoch.
    ///
    /// Returns `None` for negative values or seconds beyond `u64`.
    #[must_use]
    pub fn from_nanos(nanos: i128) -> Option<Self> {
        if nanos < 0 {
            return None;
        }
        let seconds = u64::try_from(nanos / i128::from(Self::NANOS_PER_SEC)).ok()?;
        let nanoseconds = u32::try_from(nanos % i128::from(Self::NANOS_PER_SEC)).ok()?;
        Some(Self {
            seconds,
            nanoseconds,
        })
    }

    /// Signed difference in nanoseconds: `self - other`.
    #[must_use]
    pub fn diff_nanos(&self, other: &Self) -> i128 {
        self.to_nanos() - other.to_nanos()
    }

    /// Decode the wire form: `seconds_msb` (u16), `seconds_lsb` (u32), nanoseconds (u32).
    ///
    /// Returns `None` if the slice is too short.
    #[must_use]
    pub fn decode_wire(data: &[u8]) -> Option<Self> {
        if data.len() < Self::WIRE_SIZE {
            return None;
        }
        let msb = BigEndian::read_u16(&data[0..2]);
        let lsb = BigEndian::read_u32(&data[2..6]);
        Some(Self {
            seconds: (u64::from(msb) << 32) | u64::from(lsb),
            nanoseconds: BigEndian::read_u32(&data[6..10]),
        })
    }

    /// Encode the wire form into the first 10 bytes of `out`.
    ///
    /// Seconds above 48 bits are truncated to the low 48.
    ///
    /// # Panics
    /// Panics if `out` is shorter than [`Self::WIRE_SIZE`]; callers size the
    /// slice from the fixed message layout.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Seconds are split into 16 + 32 bit wire fields by design"
    )]
    pub fn encode_wire(&self, out: &mut [u8]) {
        let seconds = self.seconds & Self::MAX_SECONDS_48BIT;
        BigEndian::write_u16(&mut out[0..2], (seconds >> 32) as u16);
        BigEndian::write_u32(&mut out[2..6], seconds as u32);
        BigEndian::write_u32(&mut out[6..10], self.nanoseconds);
    }

    /// Encode to a fresh 10-byte array.
    #[must_use]
    pub fn to_wire(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        self.encode_wire(&mut buf);
        buf
    }
}

impl std::fmt::Display for PtpTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanoseconds)
    }
}

impl std::ops::Sub for PtpTimestamp {
    type Output = i128;

    fn sub(self, rhs: Self) -> Self::Output {
        self.diff_nanos(&rhs)
    }
}

impl From<Duration> for PtpTimestamp {
    fn from(d: Duration) -> Self {
        Self {
            seconds: d.as_secs(),
            nanoseconds: d.subsec_nanos(),
        }
    }
}

impl From<PtpTimestamp> for Duration {
    fn from(ts: PtpTimestamp) -> Self {
        Duration::new(ts.seconds, ts.nanoseconds)
    }
}
