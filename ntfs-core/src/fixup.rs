//! Update Sequence Array ("fixup") protection for multi-sector FILE/INDX
//! blocks.

use crate::primitive::read_u16;
use log::warn;

/// Verifies and patches the Update Sequence Array of a FILE/INDX block in
/// place, on the caller's private copy of `block`.
///
/// `usa_offset`/`usa_count` come from the block header (offset 0x04/0x06 in
/// both FILE and INDX blocks). A USN mismatch is logged and the sector is
/// patched anyway — per spec §4.4/§9 this is forensic-robustness behavior,
/// not a hard failure.
pub fn apply_fixup(block: &mut [u8], usa_offset: usize, usa_count: usize, bytes_per_sector: usize) {
    if usa_count == 0 {
        return;
    }

    let update_seq = match read_u16(block, usa_offset) {
        Ok(v) => v,
        Err(_) => return,
    };

    for i in 0..usa_count.saturating_sub(1) {
        let sector_end = (i + 1) * bytes_per_sector;
        if sector_end > block.len() || sector_end < 2 {
            break;
        }
        let check_at = sector_end - 2;

        let fixup_slot_offset = usa_offset + 2 + i * 2;
        let fixup = match read_u16(block, fixup_slot_offset) {
            Ok(v) => v,
            Err(_) => break,
        };

        let current = match read_u16(block, check_at) {
            Ok(v) => v,
            Err(_) => break,
        };

        if current != update_seq {
            warn!(
                "fixup USN mismatch at sector {i}: expected 0x{update_seq:04x}, found 0x{current:04x}; continuing"
            );
        }

        let fixup_bytes = fixup.to_le_bytes();
        block[check_at..check_at + 2].copy_from_slice(&fixup_bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patches_sector_tails_with_fixup_values() {
        let mut block = vec![0u8; 1024];
        // Two 512-byte sectors -> usa_count = 3 (1 USN word + 2 fixup words).
        let usa_offset = 0x04;
        block[usa_offset..usa_offset + 2].copy_from_slice(&0xABCDu16.to_le_bytes());
        block[usa_offset + 2..usa_offset + 4].copy_from_slice(&0x1111u16.to_le_bytes());
        block[usa_offset + 4..usa_offset + 6].copy_from_slice(&0x2222u16.to_le_bytes());

        block[510..512].copy_from_slice(&0xABCDu16.to_le_bytes());
        block[1022..1024].copy_from_slice(&0xABCDu16.to_le_bytes());

        apply_fixup(&mut block, usa_offset, 3, 512);

        assert_eq!(&block[510..512], &0x1111u16.to_le_bytes());
        assert_eq!(&block[1022..1024], &0x2222u16.to_le_bytes());
    }

    #[test]
    fn mismatched_usn_still_patches() {
        let mut block = vec![0u8; 512];
        let usa_offset = 0x04;
        block[usa_offset..usa_offset + 2].copy_from_slice(&0xABCDu16.to_le_bytes());
        block[usa_offset + 2..usa_offset + 4].copy_from_slice(&0x9999u16.to_le_bytes());
        // Sector tail deliberately wrong.
        block[510..512].copy_from_slice(&0xFFFFu16.to_le_bytes());

        apply_fixup(&mut block, usa_offset, 2, 512);

        assert_eq!(&block[510..512], &0x9999u16.to_le_bytes());
    }
}
