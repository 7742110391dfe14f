//! Long filename to 8.3 short name conversion.

/// Space-padded, uppercase 8.3 name as stored in a directory entry.
pub type ShortName = [u8; 11];

pub const DOT_NAME: ShortName = *b".          ";
pub const DOTDOT_NAME: ShortName = *b"..         ";

const BASE_LEN: usize = 8;
const EXT_LEN: usize = 3;
const PUNCTUATION: &[u8] = b"!#$%'()-@^_`{}~";

/// Marks a deleted entry when found in the first name byte.
const DELETED_MARKER: u8 = 0xE5;
/// Stands in for a literal 0xE5 first byte.
const DELETED_ESCAPE: u8 = 0x05;

fn is_valid_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || PUNCTUATION.contains(&b) || b >= 0x80
}

/// Convert a long filename into an 8.3 short name.
///
/// Returns `None` when the name cannot be represented without mangling:
/// disallowed characters, more than one dot, an empty base, a base longer
/// than 8 bytes or an extension longer than 3.
pub fn convert(long_name: &[u8]) -> Option<ShortName> {
    let (base, ext) = match long_name.iter().position(|&b| b == b'.') {
        Some(dot) => (&long_name[..dot], &long_name[dot + 1..]),
        None => (long_name, &[][..]),
    };

    if base.is_empty() || base.len() > BASE_LEN || ext.len() > EXT_LEN {
        return None;
    }
    if !base.iter().chain(ext).all(|&b| is_valid_byte(b)) {
        return None;
    }

    let mut name = [b' '; 11];
    for (dst, &src) in name[..BASE_LEN].iter_mut().zip(base) {
        *dst = src.to_ascii_uppercase();
    }
    for (dst, &src) in name[BASE_LEN..].iter_mut().zip(ext) {
        *dst = src.to_ascii_uppercase();
    }
    if name[0] == DELETED_MARKER {
        name[0] = DELETED_ESCAPE;
    }
    Some(name)
}

/// Render a short name as `BASE.EXT` for log messages.
pub fn display(name: &ShortName) -> String {
    let base = String::from_utf8_lossy(&name[..BASE_LEN]);
    let ext = String::from_utf8_lossy(&name[BASE_LEN..]);
    let base = base.trim_end();
    let ext = ext.trim_end();
    if ext.is_empty() {
        base.to_string()
    } else {
        format!("{base}.{ext}")
    }
}
