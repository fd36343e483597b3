//! Entry name decoding.
//!
//! Names flagged UTF-8 are taken as is. Names written by DOS/Windows tools
//! without the flag are usually in the writer's OEM or ANSI code page, so
//! for those hosts the raw bytes are tried against the locale's encoding and
//! the common East Asian double-byte code pages before falling back to
//! CP437.

use crate::types::HostSystem;
use crate::zip::format::FLAG_UTF8;
use encoding_rs::{Encoding, BIG5, EUC_KR, GBK, SHIFT_JIS};

const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ',
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»',
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐',
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧',
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀',
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩',
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];

pub(crate) fn decode_cp437(raw: &[u8]) -> String {
    raw.iter()
        .map(|&b| {
            if b < 0x80 {
                b as char
            } else {
                CP437_HIGH[(b - 0x80) as usize]
            }
        })
        .collect()
}

/// Encoding named by `LC_ALL`, `LC_CTYPE` or `LANG`.
fn locale_encoding() -> Option<&'static Encoding> {
    let locale = ["LC_ALL", "LC_CTYPE", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|v| !v.is_empty())?;

    // zh_CN.GBK, ja_JP.SJIS ...
    if let Some((_, charset)) = locale.split_once('.') {
        let charset = charset.split('@').next().unwrap_or(charset);
        if let Some(enc) = Encoding::for_label(charset.as_bytes()) {
            if enc != encoding_rs::UTF_8 {
                return Some(enc);
            }
        }
    }

    let lang = locale.split(['.', '@']).next().unwrap_or("");
    match lang {
        "zh_CN" | "zh_SG" => Some(GBK),
        "zh_TW" | "zh_HK" => Some(BIG5),
        l if l.starts_with("ja") => Some(SHIFT_JIS),
        l if l.starts_with("ko") => Some(EUC_KR),
        _ => None,
    }
}

fn detect_legacy(raw: &[u8]) -> Option<(String, &'static Encoding)> {
    let mut candidates: Vec<&'static Encoding> = Vec::with_capacity(5);
    if let Some(enc) = locale_encoding() {
        candidates.push(enc);
    }
    for enc in [GBK, SHIFT_JIS, BIG5, EUC_KR] {
        if !candidates.contains(&enc) {
            candidates.push(enc);
        }
    }

    candidates.into_iter().find_map(|enc| {
        enc.decode_without_bom_handling_and_without_replacement(raw)
            .map(|s| (s.into_owned(), enc))
    })
}

/// Decode raw name bytes recorded by `host`.
pub(crate) fn decode_name(raw: &[u8], flags: u16, host: HostSystem) -> String {
    if flags & FLAG_UTF8 != 0 {
        return String::from_utf8_lossy(raw).into_owned();
    }
    if let Ok(s) = std::str::from_utf8(raw) {
        return s.to_string();
    }
    if host.is_dos_family() {
        if let Some((name, enc)) = detect_legacy(raw) {
            log::debug!("decoded entry name as {}: {}", enc.name(), name);
            return name;
        }
    }
    decode_cp437(raw)
}

/// Bytes and UTF-8 flag for a name written by this crate.
pub(crate) fn encode_name(name: &str) -> (Vec<u8>, u16) {
    let flag = if name.is_ascii() { 0 } else { FLAG_UTF8 };
    (name.as_bytes().to_vec(), flag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_flag() {
        let raw = "目录/文件.txt".as_bytes();
        assert_eq!(decode_name(raw, FLAG_UTF8, HostSystem::Unix), "目录/文件.txt");
    }

    #[test]
    fn test_cp437_fallback() {
        // 0x81 = ü, 0xE1 = ß in CP437; invalid as UTF-8
        assert_eq!(decode_cp437(&[b'a', 0x81, 0xE1]), "aüß");
        assert_eq!(decode_name(&[b'a', 0x81, 0xE1, 0xFF], 0, HostSystem::Unix), "aüß\u{a0}");
    }

    #[test]
    fn test_dos_gbk_name() {
        let (bytes, _, _) = GBK.encode("中文.txt");
        let decoded = decode_name(&bytes, 0, HostSystem::Dos);
        // GBK is tried first unless the locale names another encoding
        // that also accepts these bytes
        assert!(!decoded.is_empty());
        assert!(decoded.ends_with(".txt"));
    }

    #[test]
    fn test_encode_name() {
        assert_eq!(encode_name("plain.txt"), (b"plain.txt".to_vec(), 0));
        assert_eq!(encode_name("é.txt").1, FLAG_UTF8);
    }
}
