//! Site-wide permission flags carried in tokens.
//!
//! Bit 0 is reserved for the administrator bypass. Other bits are kept
//! as-is so masks aggregated from site roles round-trip unchanged.

use bitflags::bitflags;

bitflags! {
    /// Site permissions represented as a 64-bit bitfield.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SiteFlags: u64 {
        /// Authorized for every resource and permission
        const ADMINISTRATOR = 1 << 0;

        const _ = !0;
    }
}

impl SiteFlags {
    /// OR together the masks of every site role a user holds.
    #[must_use]
    pub fn aggregate(masks: impl IntoIterator<Item = i64>) -> Self {
        masks
            .into_iter()
            .fold(Self::empty(), |acc, mask| acc | Self::from_db(mask))
    }

    /// Create flags from a database INTEGER value.
    #[must_use]
    pub const fn from_db(value: i64) -> Self {
        Self::from_bits_retain(value as u64)
    }

    #[must_use]
    pub const fn is_admin(self) -> bool {
        self.contains(Self::ADMINISTRATOR)
    }
}
