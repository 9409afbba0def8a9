//! Core types for the pipeline system

use bytes::Bytes;

/// Timestamp representation for media frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp {
    /// Microseconds since pipeline start
    pub micros: i64,
}

impl Timestamp {
    /// Create a new timestamp from microseconds
    pub fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    /// Create a timestamp from a nanosecond clock reading
    pub fn from_nanos(nanos: i64) -> Self {
        Self {
            micros: nanos / 1_000,
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}µs", self.micros)
    }
}

/// Kind of media data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaKind {
    /// Video frame data
    #[default]
    Video,
    /// Audio sample data
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "Video"),
            MediaKind::Audio => write!(f, "Audio"),
        }
    }
}

/// The unit of data moving through a chain.
///
/// A packet without a buffer is the "nothing this tick" sentinel. It is not an
/// error: stages that need data answer it with a retry.
#[derive(Clone, Default)]
pub struct Packet {
    /// Stream the packet belongs to
    pub kind: MediaKind,

    /// Payload records, written one after the other; none for the sentinel
    records: Vec<Bytes>,

    /// Width and height of raw video; `None` once the payload is encoded
    pub dimensions: Option<(u32, u32)>,

    /// Out-of-band bytes delivered before the payload (codec header)
    side_data: Option<Bytes>,

    /// Presentation timestamp
    pub pts: Option<Timestamp>,

    /// Duration in encoder ticks, zero when unknown
    pub duration: i64,
}

impl Packet {
    /// Create the sentinel packet for a stream
    pub fn empty(kind: MediaKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Create a raw video packet
    pub fn video(data: Bytes, width: u32, height: u32, pts: Timestamp) -> Self {
        Self {
            kind: MediaKind::Video,
            records: vec![data],
            dimensions: Some((width, height)),
            side_data: None,
            pts: Some(pts),
            duration: 0,
        }
    }

    /// Whether this is the sentinel packet
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First payload record; the whole payload for raw video
    pub fn data(&self) -> Option<&Bytes> {
        self.records.first()
    }

    pub fn set_data(&mut self, data: Bytes) {
        self.records = vec![data];
    }

    pub fn records(&self) -> &[Bytes] {
        &self.records
    }

    /// Replace the payload with `records`; an empty list makes the sentinel
    pub fn set_records(&mut self, records: Vec<Bytes>) {
        self.records = records;
    }

    pub fn side_data(&self) -> Option<&Bytes> {
        self.side_data.as_ref()
    }

    pub fn set_side_data(&mut self, side_data: Bytes) {
        self.side_data = Some(side_data);
    }

    /// Get the size of the payload in bytes, over all records
    pub fn size(&self) -> usize {
        self.records.iter().map(Bytes::len).sum()
    }

    /// Drop payload and metadata, turning the packet back into the sentinel
    pub fn clear(&mut self) {
        let kind = self.kind;
        *self = Packet::empty(kind);
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("Packet");
        debug.field("kind", &self.kind).field("size", &self.size());
        if self.records.len() > 1 {
            debug.field("records", &self.records.len());
        }

        if let Some((width, height)) = self.dimensions {
            debug.field("width", &width).field("height", &height);
        }
        if let Some(side) = &self.side_data {
            debug.field("side_data", &side.len());
        }
        if let Some(pts) = self.pts {
            debug.field("pts", &pts);
        }

        debug.finish()
    }
}
