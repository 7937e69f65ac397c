/// Maximum label length including the terminator (mirrors `TRACE_EVENT_PAYLOAD_MAX`).
pub const LABEL_MAX: usize = 52;

/// A single trace-site event: a timestamp, an OS thread id and an opaque label.
///
/// Fixed-size, plain-data, `#[repr(C)]` so its layout is stable across the
/// producer and consumer binaries that share it via [`crate::ring::SharedRing`].
/// Total size is 64 bytes, naturally aligned to 8 bytes, with no implicit
/// padding. The label is never interpreted here or by the dispatcher — only
/// the stack-trace adapter compares it.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Event {
    /// Monotonic timestamp in nanoseconds.
    pub timestamp: u64,
    /// OS-assigned thread id of the emitting thread.
    pub thread_id: u32,
    /// Zero-padded label bytes, treated as a terminator-or-length string.
    label: [u8; LABEL_MAX],
}

impl Event {
    /// Creates an event, copying up to `LABEL_MAX - 1` bytes of `label` and
    /// zero-padding/terminating the rest (mirrors the C original's
    /// `snprintf(event.data, TRACE_EVENT_PAYLOAD_MAX, "%s", label)` truncation).
    #[must_use]
    pub fn new(timestamp: u64, thread_id: u32, label: &str) -> Self {
        let mut bytes = [0u8; LABEL_MAX];
        let src = label.as_bytes();
        let n = src.len().min(LABEL_MAX - 1);
        bytes[..n].copy_from_slice(&src[..n]);
        Self {
            timestamp,
            thread_id,
            label: bytes,
        }
    }

    /// The empty event used by zero-initialized ring slots.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            timestamp: 0,
            thread_id: 0,
            label: [0u8; LABEL_MAX],
        }
    }

    /// The raw, zero-padded label bytes.
    #[must_use]
    pub fn label_bytes(&self) -> &[u8; LABEL_MAX] {
        &self.label
    }

    /// The label as a string, up to the first zero byte. Lossy on invalid UTF-8.
    #[must_use]
    pub fn label(&self) -> std::borrow::Cow<'_, str> {
        let end = self.label.iter().position(|&b| b == 0).unwrap_or(self.label.len());
        String::from_utf8_lossy(&self.label[..end])
    }

    /// Returns `true` if the label is empty (the adapter's "ignore" case).
    #[must_use]
    pub fn label_is_empty(&self) -> bool {
        self.label[0] == 0
    }

    /// Whether this event's label equals another's, byte for byte.
    #[must_use]
    pub fn label_eq(&self, other: &Event) -> bool {
        self.label == other.label
    }

    /// Whether this event's label equals the raw bytes of another label buffer.
    #[must_use]
    pub fn label_eq_bytes(&self, other: &[u8; LABEL_MAX]) -> bool {
        &self.label == other
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pads_and_nul_terminates() {
        let e = Event::new(100, 7, "A");
        assert_eq!(e.label(), "A");
        assert!(e.label_bytes()[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn new_truncates_overlong_labels() {
        let long = "x".repeat(LABEL_MAX + 10);
        let e = Event::new(0, 0, &long);
        assert_eq!(e.label().len(), LABEL_MAX - 1);
    }

    #[test]
    fn empty_label_detected() {
        let e = Event::new(0, 0, "");
        assert!(e.label_is_empty());
    }

    #[test]
    fn size_and_alignment_are_fixed() {
        assert_eq!(std::mem::size_of::<Event>(), 64);
        assert_eq!(std::mem::align_of::<Event>(), 8);
    }
}
