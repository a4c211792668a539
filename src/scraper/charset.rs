//! Charset detection for fetched pages.
//!
//! Source sites serve legacy Chinese encodings without reliable headers, so each candidate is
//! tried with strict (non-replacing) decoding and the first clean decode wins.

use encoding_rs::{Encoding, BIG5, GB18030, UTF_8};
use std::borrow::Cow;

/// Tried in order after BOM sniffing. GB18030 decodes everything GBK and GB2312 do.
const CANDIDATES: [&Encoding; 3] = [UTF_8, GB18030, BIG5];

/// Decode page bytes. Returns None when no candidate decodes without errors.
pub fn decode_page(bytes: &[u8]) -> Option<Cow<'_, str>> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        return encoding.decode_without_bom_handling_and_without_replacement(&bytes[bom_len..]);
    }
    CANDIDATES
        .iter()
        .find_map(|enc| enc.decode_without_bom_handling_and_without_replacement(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_passes_through() {
        let text = "作者：某人";
        assert_eq!(decode_page(text.as_bytes()).as_deref(), Some(text));
    }

    #[test]
    fn gbk_bytes_decode() {
        let (bytes, _, had_errors) = encoding_rs::GBK.encode("第一卷 序章");
        assert!(!had_errors);
        assert_eq!(decode_page(&bytes).as_deref(), Some("第一卷 序章"));
    }

    #[test]
    fn bom_selects_encoding() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("插图".as_bytes());
        assert_eq!(decode_page(&bytes).as_deref(), Some("插图"));
    }

    #[test]
    fn undecodable_bytes_return_none() {
        // 0xFF is not a valid byte in UTF-8, GB18030, or Big5.
        assert!(decode_page(&[0xFF, 0xFF, 0xFF]).is_none());
    }
}
