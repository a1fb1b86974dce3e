/// Hardware abstraction for supported boards.
///
/// Each board module defines the constants the firmware needs, selected
/// at compile time via feature flags.

#[cfg(feature = "board-xiao")]
mod hw {
    pub const BOARD_NAME: &str = "xiao_esp32s3";
    pub const CPU_FREQ_MHZ: u32 = 240;
}

#[cfg(all(feature = "board-m5stickc", not(feature = "board-xiao")))]
mod hw {
    pub const BOARD_NAME: &str = "m5stickc_plus2";
    pub const CPU_FREQ_MHZ: u32 = 240;
}

#[cfg(not(any(feature = "board-xiao", feature = "board-m5stickc")))]
mod hw {
    pub const BOARD_NAME: &str = "generic_esp32";
    pub const CPU_FREQ_MHZ: u32 = 240;
}

pub use hw::*;
