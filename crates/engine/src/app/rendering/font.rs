//! 3x5 bitmap font for the software backend.

pub(crate) const GLYPH_WIDTH: u32 = 3;
pub(crate) const GLYPH_HEIGHT: u32 = 5;

const FIRST_PRINTABLE: u32 = 0x20;
const FALLBACK_GLYPH: char = '?';

// Printable ASCII from ' ' to '~'. Rows are packed top to bottom, three bits
// per row, leftmost column in the high bit.
const GLYPHS: [u16; 95] = [
    0x0000, 0x2482, 0x5a00, 0x5f7d, 0x7ddf, 0x52a5, 0x2aab, 0x2400,
    0x1491, 0x4494, 0x0aa8, 0x05d0, 0x0014, 0x01c0, 0x0002, 0x12a4,
    0x7b6f, 0x2c97, 0x73e7, 0x73cf, 0x5bc9, 0x79cf, 0x79ef, 0x7292,
    0x7bef, 0x7bcf, 0x0410, 0x0414, 0x1511, 0x0e38, 0x4454, 0x72c2,
    0x7be7, 0x2bed, 0x6bae, 0x7927, 0x6b6e, 0x79a7, 0x79a4, 0x796f,
    0x5bed, 0x7497, 0x726f, 0x5bad, 0x4927, 0x5fed, 0x5ffd, 0x7b6f,
    0x6ba4, 0x7b79, 0x6bad, 0x79cf, 0x7492, 0x5b6f, 0x5b6a, 0x5bfd,
    0x5aad, 0x5a92, 0x72a7, 0x6926, 0x4889, 0x324b, 0x2a00, 0x0007,
    0x4400, 0x0e7f, 0x49ae, 0x0f27, 0x13ef, 0x0fa7, 0x39a4, 0x0f79,
    0x49ad, 0x2092, 0x106a, 0x4bad, 0x4927, 0x0ded, 0x0d6d, 0x0f6f,
    0x0d74, 0x0f79, 0x0d64, 0x0f8f, 0x2e93, 0x0b6f, 0x0b6a, 0x0b7a,
    0x0a95, 0x0b79, 0x0e57, 0x3593, 0x2492, 0x64d6, 0x0780,
];

/// Integer magnification for a requested cap height in pixels.
pub(crate) fn glyph_scale(size: f64) -> u32 {
    if !size.is_finite() || size <= 0.0 {
        return 1;
    }
    ((size / GLYPH_HEIGHT as f64).round() as u32).max(1)
}

pub(crate) fn glyph_advance(scale: u32) -> u32 {
    (GLYPH_WIDTH + 1) * scale
}

pub(crate) fn text_width(text: &str, scale: u32) -> u32 {
    match text.chars().count() as u32 {
        0 => 0,
        count => count * glyph_advance(scale) - scale,
    }
}

fn glyph_bits(ch: char) -> u16 {
    let code = ch as u32;
    let code = if (FIRST_PRINTABLE..FIRST_PRINTABLE + GLYPHS.len() as u32).contains(&code) {
        code
    } else {
        FALLBACK_GLYPH as u32
    };
    GLYPHS[(code - FIRST_PRINTABLE) as usize]
}

fn is_lit(bits: u16, col: u32, row: u32) -> bool {
    let shift = (GLYPH_HEIGHT - 1 - row) * GLYPH_WIDTH + (GLYPH_WIDTH - 1 - col);
    (bits >> shift) & 1 == 1
}

/// Calls `plot(x, y)` for every lit font cell of `text` laid out on one line,
/// in unscaled cell coordinates.
pub(crate) fn for_each_lit_cell(text: &str, mut plot: impl FnMut(u32, u32)) {
    for (index, ch) in text.chars().enumerate() {
        let bits = glyph_bits(ch);
        let left = index as u32 * (GLYPH_WIDTH + 1);
        for row in 0..GLYPH_HEIGHT {
            for col in 0..GLYPH_WIDTH {
                if is_lit(bits, col, row) {
                    plot(left + col, row);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(text: &str) -> Vec<(u32, u32)> {
        let mut lit = Vec::new();
        for_each_lit_cell(text, |x, y| lit.push((x, y)));
        lit
    }

    #[test]
    fn exclamation_mark_is_a_column_with_a_gap() {
        assert_eq!(cells("!"), vec![(1, 0), (1, 1), (1, 2), (1, 4)]);
    }

    #[test]
    fn space_has_no_lit_cells_but_still_advances() {
        assert!(cells(" ").is_empty());
        assert_eq!(cells(" !")[0], (5, 0));
    }

    #[test]
    fn unknown_characters_fall_back_to_question_mark() {
        assert_eq!(cells("é"), cells("?"));
    }

    #[test]
    fn width_excludes_trailing_gap() {
        assert_eq!(text_width("", 2), 0);
        assert_eq!(text_width("A", 1), 3);
        assert_eq!(text_width("AB", 2), 14);
    }

    #[test]
    fn scale_rounds_to_cap_height() {
        assert_eq!(glyph_scale(5.0), 1);
        assert_eq!(glyph_scale(15.0), 3);
        assert_eq!(glyph_scale(0.0), 1);
        assert_eq!(glyph_scale(f64::NAN), 1);
    }
}
