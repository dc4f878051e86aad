//! US-layout scancode to character translation tables.
//!
//! Scanners in keyboard-emulation mode produce hardware scan codes, not
//! characters. These tables map the PC/AT set-1 scan codes of the main key
//! block (Esc, digit row, three letter rows, space) to the character the key
//! produces on a US layout, with and without shift held. Linux evdev key
//! codes match this numbering for the main block, so both platforms share
//! the tables.
//!
//! Out-of-range scan codes and keys with no printable character (function
//! keys, modifiers) translate to NUL, a sentinel meaning "no character" —
//! callers must not append it to any buffer.

/// Sentinel returned for scan codes with no printable character.
pub const NUL: char = '\0';

/// Scan code of the left shift key.
pub const LEFT_SHIFT: u32 = 42;

/// Scan code of the right shift key.
pub const RIGHT_SHIFT: u32 = 54;

const ESC: char = '\x1b';
const BS: char = '\x08';
const TAB: char = '\t';
const CR: char = '\r';

/// Unshifted US layout, indexed by scan code.
const US_NORMAL: [char; 58] = [
    NUL, // 0
    ESC, '1', '2', '3', '4', '5', '6', '7', '8', '9', '0', '-', '=', BS, // 1..=14
    TAB, 'q', 'w', 'e', 'r', 't', 'y', 'u', 'i', 'o', 'p', '[', ']', CR, NUL, // 15..=29
    'a', 's', 'd', 'f', 'g', 'h', 'j', 'k', 'l', ';', '\'', '`', NUL, '\\', // 30..=43
    'z', 'x', 'c', 'v', 'b', 'n', 'm', ',', '.', '/', NUL, NUL, NUL, // 44..=56
    ' ', // 57
];

/// Shifted US layout, indexed by scan code.
const US_SHIFTED: [char; 58] = [
    NUL, // 0
    ESC, '!', '@', '#', '$', '%', '^', '&', '*', '(', ')', '_', '+', BS, // 1..=14
    TAB, 'Q', 'W', 'E', 'R', 'T', 'Y', 'U', 'I', 'O', 'P', '{', '}', CR, NUL, // 15..=29
    'A', 'S', 'D', 'F', 'G', 'H', 'J', 'K', 'L', ':', '"', '|', NUL, '|', // 30..=43
    'Z', 'X', 'C', 'V', 'B', 'N', 'M', '<', '>', '?', NUL, NUL, NUL, // 44..=56
    ' ', // 57
];

/// Translates a scan code to the character it produces on a US layout.
///
/// Returns [`NUL`] for scan codes outside the table or for keys without a
/// printable character. No side effects, no failure modes.
pub fn char_for(scancode: u32, shift: bool) -> char {
    let table = if shift { &US_SHIFTED } else { &US_NORMAL };
    table.get(scancode as usize).copied().unwrap_or(NUL)
}

/// `true` when the scan code is one of the two shift keys.
pub fn is_shift(scancode: u32) -> bool {
    scancode == LEFT_SHIFT || scancode == RIGHT_SHIFT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_row_translates_unshifted() {
        assert_eq!(char_for(2, false), '1');
        assert_eq!(char_for(10, false), '9');
        assert_eq!(char_for(11, false), '0');
    }

    #[test]
    fn test_digit_row_translates_shifted_to_symbols() {
        assert_eq!(char_for(2, true), '!');
        assert_eq!(char_for(3, true), '@');
        assert_eq!(char_for(11, true), ')');
    }

    #[test]
    fn test_letters_follow_shift_state() {
        assert_eq!(char_for(16, false), 'q');
        assert_eq!(char_for(16, true), 'Q');
        assert_eq!(char_for(50, false), 'm');
        assert_eq!(char_for(50, true), 'M');
    }

    #[test]
    fn test_enter_translates_to_carriage_return() {
        // Matters because the default trailer is "\r".
        assert_eq!(char_for(28, false), '\r');
        assert_eq!(char_for(28, true), '\r');
    }

    #[test]
    fn test_modifiers_and_out_of_range_return_nul() {
        assert_eq!(char_for(LEFT_SHIFT, false), NUL);
        assert_eq!(char_for(RIGHT_SHIFT, true), NUL);
        assert_eq!(char_for(29, false), NUL); // left ctrl
        assert_eq!(char_for(58, false), NUL); // first code past the table
        assert_eq!(char_for(0xFFFF, false), NUL);
    }

    #[test]
    fn test_shift_detection() {
        assert!(is_shift(LEFT_SHIFT));
        assert!(is_shift(RIGHT_SHIFT));
        assert!(!is_shift(30));
    }

    #[test]
    fn test_space_is_last_table_entry() {
        assert_eq!(char_for(57, false), ' ');
        assert_eq!(char_for(57, true), ' ');
    }
}
