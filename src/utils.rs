pub struct Utils;

impl Utils {
    /// Little-endian u16 at `offset`; the caller guarantees bounds.
    pub fn u16ify(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }
}
