/// Board constants for the supported ESP32 targets.
///
/// Selected at compile time via feature flags. Host builds report
/// `"host"`.

#[cfg(feature = "board-xiao")]
mod hw {
    pub const BOARD_NAME: &str = "xiao_esp32s3";
    pub const CORE_COUNT: u8 = 2;
    /// Task stack per pipeline stage (bytes).
    pub const STAGE_STACK_SIZE: usize = 4096;
}

#[cfg(all(feature = "board-m5stickc", not(feature = "board-xiao")))]
mod hw {
    pub const BOARD_NAME: &str = "m5stickc_plus2";
    pub const CORE_COUNT: u8 = 2;
    pub const STAGE_STACK_SIZE: usize = 4096;
}

#[cfg(not(any(feature = "board-xiao", feature = "board-m5stickc")))]
mod hw {
    pub const BOARD_NAME: &str = "host";
    pub const CORE_COUNT: u8 = 1;
    pub const STAGE_STACK_SIZE: usize = 64 * 1024;
}

pub use hw::*;
