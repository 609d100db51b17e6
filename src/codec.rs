use bytes::{Buf, BytesMut};
use std::io;
use tokio_util::codec::Decoder;
use tracing::warn;

/// Re-encodes an upload in a legacy charset (e.g. windows-1252 exports from
/// spreadsheet tools) into UTF-8 chunks for the CSV reader.
pub struct Utf8Transcoder {
    decoder: encoding_rs::Decoder,
    encoding: &'static encoding_rs::Encoding,
    replaced: bool,
}

impl Utf8Transcoder {
    pub fn new(encoding: &'static encoding_rs::Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder(),
            encoding,
            replaced: false,
        }
    }

    fn transcode(&mut self, src: &mut BytesMut, last: bool) -> Option<BytesMut> {
        let capacity = self
            .decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or_else(|| src.len() * 3 + 4);
        let mut out = vec![0u8; capacity];

        let (_result, read, written, had_errors) =
            self.decoder.decode_to_utf8(src, &mut out, last);

        if had_errors && !self.replaced {
            self.replaced = true;
            warn!(
                charset = self.encoding.name(),
                "upload contains bytes not valid in its charset; replaced with U+FFFD"
            );
        }

        src.advance(read);
        (written > 0).then(|| BytesMut::from(&out[..written]))
    }
}

impl Decoder for Utf8Transcoder {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        Ok(self.transcode(src, false))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if buf.is_empty() {
            return Ok(None);
        }
        let out = self.transcode(buf, true);
        buf.clear();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_1252_becomes_utf8() {
        let mut t = Utf8Transcoder::new(encoding_rs::WINDOWS_1252);
        // "José" with é as 0xE9
        let mut src = BytesMut::from(&b"Jos\xe9,10"[..]);
        let out = t.decode_eof(&mut src).unwrap().unwrap();
        assert_eq!(std::str::from_utf8(&out).unwrap(), "José,10");
        assert!(src.is_empty());
    }

    #[test]
    fn split_multibyte_input_is_carried_over() {
        let mut t = Utf8Transcoder::new(encoding_rs::UTF_16LE);
        // "ab" in UTF-16LE, split in the middle of the second code unit
        let mut first = BytesMut::from(&b"a\x00b"[..]);
        let head = t.decode(&mut first).unwrap().unwrap();
        assert_eq!(&head[..], b"a");
        let mut rest = BytesMut::from(&b"\x00"[..]);
        let tail = t.decode_eof(&mut rest).unwrap().unwrap();
        assert_eq!(&tail[..], b"b");
    }
}
