use crate::{TagCodec, TagData, NXP_MANUFACTURER, TAG_SIZE, UID_SIZE};
use rand::Rng;

impl TagCodec {
    /// Lazily produce up to `count` re-encrypted copies of `source`, each
    /// under a fresh random serial. Every call starts an independent
    /// sequence.
    ///
    /// A failed iteration is logged and skipped rather than aborting the
    /// batch, so the sequence may come up short of `count`.
    pub fn random_serials<'a>(
        &'a self,
        source: &'a TagData,
        count: usize,
    ) -> RandomSerials<'a> {
        RandomSerials {
            codec: self,
            source,
            remaining: count,
        }
    }
}

/// Iterator over freshly serialed, re-encrypted dumps. See
/// [`TagCodec::random_serials`].
pub struct RandomSerials<'a> {
    codec: &'a TagCodec,
    source: &'a TagData,
    remaining: usize,
}

impl RandomSerials<'_> {
    /// New 7-byte serial: manufacturer byte fixed, the rest random. The fixed
    /// first byte keeps the result clear of the reserved cascade value.
    fn next_uid() -> [u8; UID_SIZE] {
        let mut uid = [0; UID_SIZE];
        rand::thread_rng().fill(&mut uid[1..]);
        uid[0] = NXP_MANUFACTURER;
        uid
    }
}

impl Iterator for RandomSerials<'_> {
    type Item = [u8; TAG_SIZE];

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining > 0 {
            self.remaining -= 1;
            let uid = Self::next_uid();
            let mut data = self.source.clone();
            match data.set_uid(uid).and_then(|()| self.codec.encrypt(&data)) {
                Ok(dump) => return Some(dump),
                Err(err) => {
                    tracing::warn!(%err, "skipping serial that failed to re-encrypt");
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}
