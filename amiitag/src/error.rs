use crate::Half;

#[derive(thiserror::Error)]
pub enum Error {
    // std errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // crate errors
    #[error("dump is {0} bytes, expected {}", super::TAG_SIZE)]
    DumpSize(usize),

    #[error("key material is {got} bytes, expected {expected}")]
    KeySize { got: usize, expected: usize },

    #[error("magic bytes length {0} exceeds {}", super::keys::MAGIC_BYTES_MAX)]
    MagicBytes(u8),

    #[error("{0} half failed integrity check")]
    Integrity(Half),

    #[error("record is {0} bytes, expected {}", super::TAG_SIZE)]
    RecordSize(usize),

    #[error("serial byte 0 is the reserved cascade tag {0:#04x}")]
    ReservedUid(u8),
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}
