use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Usage restrictions carried by keys, seeds and domain parameters.
    ///
    /// The upper 16 bits mirror the lower ones for material derived from the
    /// object: `ALLOW_DERIVED_X == ALLOW_X << 16`. There is exactly one derived
    /// tier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AllowedUsage: u32 {
        const ALLOW_DATA_ENCRYPTION = 0x0001;
        const ALLOW_DATA_DECRYPTION = 0x0002;
        const ALLOW_SIGNATURE = 0x0004;
        const ALLOW_VERIFICATION = 0x0008;
        const ALLOW_KEY_AGREEMENT = 0x0010;
        const ALLOW_KEY_DIVERSIFY = 0x0020;
        const ALLOW_RNG_INIT = 0x0040;
        const ALLOW_KDF_MATERIAL = 0x0080;
        const ALLOW_KEY_EXPORTING = 0x0100;
        const ALLOW_KEY_IMPORTING = 0x0200;
        const ALLOW_EXACT_MODE_ONLY = 0x8000;

        const ALLOW_DERIVED_DATA_ENCRYPTION = Self::ALLOW_DATA_ENCRYPTION.bits() << 16;
        const ALLOW_DERIVED_DATA_DECRYPTION = Self::ALLOW_DATA_DECRYPTION.bits() << 16;
        const ALLOW_DERIVED_SIGNATURE = Self::ALLOW_SIGNATURE.bits() << 16;
        const ALLOW_DERIVED_VERIFICATION = Self::ALLOW_VERIFICATION.bits() << 16;
        const ALLOW_DERIVED_KEY_DIVERSIFY = Self::ALLOW_KEY_DIVERSIFY.bits() << 16;
        const ALLOW_DERIVED_RNG_INIT = Self::ALLOW_RNG_INIT.bits() << 16;
        const ALLOW_DERIVED_KDF_MATERIAL = Self::ALLOW_KDF_MATERIAL.bits() << 16;
        const ALLOW_DERIVED_KEY_EXPORTING = Self::ALLOW_KEY_EXPORTING.bits() << 16;
        const ALLOW_DERIVED_KEY_IMPORTING = Self::ALLOW_KEY_IMPORTING.bits() << 16;
        const ALLOW_DERIVED_EXACT_MODE_ONLY = Self::ALLOW_EXACT_MODE_ONLY.bits() << 16;

        const ALLOW_KDF_MATERIAL_ANY_USAGE = Self::ALLOW_KDF_MATERIAL.bits()
            | Self::ALLOW_DERIVED_DATA_ENCRYPTION.bits()
            | Self::ALLOW_DERIVED_DATA_DECRYPTION.bits()
            | Self::ALLOW_DERIVED_SIGNATURE.bits()
            | Self::ALLOW_DERIVED_VERIFICATION.bits()
            | Self::ALLOW_DERIVED_KEY_DIVERSIFY.bits()
            | Self::ALLOW_DERIVED_RNG_INIT.bits()
            | Self::ALLOW_DERIVED_KDF_MATERIAL.bits()
            | Self::ALLOW_DERIVED_KEY_EXPORTING.bits()
            | Self::ALLOW_DERIVED_KEY_IMPORTING.bits();
    }
}

impl AllowedUsage {
    /// No usage at all: the object may only serve as a prototype.
    pub const PROTOTYPED_ONLY: Self = Self::empty();

    /// Usage flags that material derived from this object may carry.
    pub fn derived_usage(&self) -> Self {
        Self::from_bits_truncate(self.bits() >> 16)
    }

    /// Returns `true` if `requested` may be granted to material derived from
    /// this object.
    pub fn permits_derived(&self, requested: Self) -> bool {
        self.derived_usage().contains(requested.base_usage())
    }

    /// The lower (non-derived) half of the flags.
    pub fn base_usage(&self) -> Self {
        Self::from_bits_truncate(self.bits() & 0xFFFF)
    }
}
