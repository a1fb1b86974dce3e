/// Radio event model for passive BLE scanning.
///
/// The platform's scan callback translates each radio event into a
/// [`ScanEvent`] and hands it to the dispatcher. Advertisements borrow the
/// radio's buffers and live only for the duration of one callback.

use core::fmt::Write;

/// Length of a BLE device address in bytes
pub const ADDR_LEN: usize = 6;

/// A 6-byte BLE device address, most significant byte first
pub type Address = [u8; ADDR_LEN];

/// Printable address: 12 lowercase hex characters, no separators
pub type AddrString = heapless::String<{ ADDR_LEN * 2 }>;

/// Address type tags as reported by the controller
pub mod addr_type {
    pub const PUBLIC: u8 = 0;
    pub const RANDOM: u8 = 1;
}

/// Advertising PDU type tags as reported by the controller
pub mod adv_type {
    pub const ADV_IND: u8 = 0;
    pub const ADV_DIRECT_IND: u8 = 1;
    pub const ADV_SCAN_IND: u8 = 2;
    pub const ADV_NONCONN_IND: u8 = 3;
    pub const SCAN_RSP: u8 = 4;
}

/// One observed BLE broadcast
#[derive(Debug, Clone, Copy)]
pub struct Advertisement<'a> {
    pub addr_type: u8,
    pub addr: Address,
    pub adv_type: u8,
    pub rssi: i8,
    /// Raw advertisement payload (AD structures)
    pub data: &'a [u8],
}

/// Radio event delivered to the dispatcher
#[derive(Debug, Clone, Copy)]
pub enum ScanEvent<'a> {
    /// An advertisement was received
    ScanResult(Advertisement<'a>),
    /// The current scan round ended
    ScanDone,
    /// Any other controller event, carrying its raw code
    Other(u8),
}

/// Write `bytes` as lowercase hex into `out`.
///
/// Stops silently when `out` runs out of capacity. Only whole bytes are
/// written.
pub fn format_hex<const N: usize>(bytes: &[u8], out: &mut heapless::String<N>) {
    for b in bytes {
        if out.capacity() - out.len() < 2 {
            return;
        }
        let _ = write!(out, "{:02x}", b);
    }
}

/// Format a device address the way it appears in logs and constants.
pub fn format_addr(addr: &Address) -> AddrString {
    let mut s = AddrString::new();
    format_hex(addr, &mut s);
    s
}
