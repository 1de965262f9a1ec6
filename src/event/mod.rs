use std::fmt;

/// EventKind identifies the kind of traced occurrence.
/// Values are part of the serialized record layout and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    /// Method entry.
    Call = 1,
    /// Method exit.
    Return = 2,
    /// Native (non-host-language) method entry.
    CCall = 3,
    /// Native method exit.
    CReturn = 4,
    /// Exception raised.
    Raise = 5,
}

/// Maximum EventKind value, used for array sizing.
pub const MAX_EVENT_KIND: usize = 5;

impl EventKind {
    /// Returns the canonical label name used in logs and configuration.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Return => "return",
            Self::CCall => "c_call",
            Self::CReturn => "c_return",
            Self::Raise => "raise",
        }
    }

    /// Convert from a raw u8 value.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Call),
            2 => Some(Self::Return),
            3 => Some(Self::CCall),
            4 => Some(Self::CReturn),
            5 => Some(Self::Raise),
            _ => None,
        }
    }

    /// Convert from the canonical label name.
    pub fn from_str(name: &str) -> Option<Self> {
        match name {
            "call" => Some(Self::Call),
            "return" => Some(Self::Return),
            "c_call" => Some(Self::CCall),
            "c_return" => Some(Self::CReturn),
            "raise" => Some(Self::Raise),
            _ => None,
        }
    }

    /// Return all event kinds in numeric order.
    pub fn all() -> &'static [Self] {
        &[
            Self::Call,
            Self::Return,
            Self::CCall,
            Self::CReturn,
            Self::Raise,
        ]
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of event kinds selected for capture, stored as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventKindSet(u8);

impl EventKindSet {
    /// The empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// The set containing every kind.
    pub fn all() -> Self {
        EventKind::all().iter().copied().collect()
    }

    /// Add a kind to the set.
    pub fn insert(&mut self, kind: EventKind) {
        self.0 |= 1 << (kind as u8);
    }

    /// Whether the set contains the given kind.
    pub fn contains(self, kind: EventKind) -> bool {
        self.0 & (1 << (kind as u8)) != 0
    }

    /// Whether the set is empty.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of kinds in the set.
    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }
}

impl FromIterator<EventKind> for EventKindSet {
    fn from_iter<I: IntoIterator<Item = EventKind>>(iter: I) -> Self {
        let mut set = Self::empty();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

/// Serialized size of one event record in bytes.
///
/// The ring buffer capacity must be an exact multiple of this so that
/// wrap-around never splits a record. The default 5 MiB capacity divides
/// exactly (5 MiB / 40 = 131072 records).
pub const RECORD_SIZE: usize = 40;

/// One traced occurrence, fixed size, copied by value.
///
/// Path, class, and method are opaque symbol identifiers interned by the
/// host; the recorder stores them verbatim and leaves resolution to an
/// offline consumer of the sink bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    /// Kind of occurrence.
    pub kind: EventKind,
    /// Capture instant in nanoseconds.
    pub timestamp_ns: u64,
    /// Identifier of the producing execution context.
    pub thread_id: u64,
    /// Interned source file path.
    pub path_id: u32,
    /// Source line number.
    pub line: u32,
    /// Interned defining class name.
    pub class_id: u32,
    /// Interned method name.
    pub method_id: u32,
}

// Little-endian record layout. Offsets are fixed; bytes 33..40 are reserved.
const OFF_TIMESTAMP: usize = 0;
const OFF_THREAD: usize = 8;
const OFF_PATH: usize = 16;
const OFF_LINE: usize = 20;
const OFF_CLASS: usize = 24;
const OFF_METHOD: usize = 28;
const OFF_KIND: usize = 32;

impl EventRecord {
    /// Serialize into the fixed wire layout.
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[OFF_TIMESTAMP..OFF_TIMESTAMP + 8].copy_from_slice(&self.timestamp_ns.to_le_bytes());
        buf[OFF_THREAD..OFF_THREAD + 8].copy_from_slice(&self.thread_id.to_le_bytes());
        buf[OFF_PATH..OFF_PATH + 4].copy_from_slice(&self.path_id.to_le_bytes());
        buf[OFF_LINE..OFF_LINE + 4].copy_from_slice(&self.line.to_le_bytes());
        buf[OFF_CLASS..OFF_CLASS + 4].copy_from_slice(&self.class_id.to_le_bytes());
        buf[OFF_METHOD..OFF_METHOD + 4].copy_from_slice(&self.method_id.to_le_bytes());
        buf[OFF_KIND] = self.kind as u8;
        buf
    }

    /// Parse one record from its wire layout.
    ///
    /// Returns `None` if the slice is not exactly `RECORD_SIZE` bytes or the
    /// kind byte is not a known `EventKind`.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() != RECORD_SIZE {
            return None;
        }

        let kind = EventKind::from_u8(data[OFF_KIND])?;

        let u64_at = |off: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&data[off..off + 8]);
            u64::from_le_bytes(b)
        };
        let u32_at = |off: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&data[off..off + 4]);
            u32::from_le_bytes(b)
        };

        Some(Self {
            kind,
            timestamp_ns: u64_at(OFF_TIMESTAMP),
            thread_id: u64_at(OFF_THREAD),
            path_id: u32_at(OFF_PATH),
            line: u32_at(OFF_LINE),
            class_id: u32_at(OFF_CLASS),
            method_id: u32_at(OFF_METHOD),
        })
    }
}
