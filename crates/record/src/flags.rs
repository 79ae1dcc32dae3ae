bitflags::bitflags! {
    /// Reader-visible status bits carried in `future_reserved[0]`.
    ///
    /// These let the writer signal trouble without an ABI bump; unknown bits
    /// are dropped on read.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatusFlags: u8 {
        /// At least one collector failed this cycle; some fields are stale.
        const DEGRADED = 0b0000_0001;
        /// The digest found in the region did not match its content.
        const HASH_MISMATCH = 0b0000_0010;
        /// A previous writer left the sequence odd.
        const SEQUENCE_STALLED = 0b0000_0100;
    }
}
