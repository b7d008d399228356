use flate2::write::{GzDecoder, ZlibDecoder};
use std::io::{self, Write};

/// Streams response chunks through the decoder named by `content-encoding`.
pub(crate) enum BodyDecoder {
    Identity(Vec<u8>),
    Gzip(GzDecoder<Vec<u8>>),
    Deflate(ZlibDecoder<Vec<u8>>),
}

impl BodyDecoder {
    /// Unknown or missing encodings pass through untouched.
    pub(crate) fn for_encoding(encoding: Option<&str>) -> Self {
        match encoding.map(|e| e.trim().to_ascii_lowercase()).as_deref() {
            Some("gzip") => BodyDecoder::Gzip(GzDecoder::new(Vec::new())),
            Some("deflate") => BodyDecoder::Deflate(ZlibDecoder::new(Vec::new())),
            _ => BodyDecoder::Identity(Vec::new()),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            BodyDecoder::Identity(_) => "identity",
            BodyDecoder::Gzip(_) => "gzip",
            BodyDecoder::Deflate(_) => "deflate",
        }
    }

    pub(crate) fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self {
            BodyDecoder::Identity(buf) => {
                buf.extend_from_slice(chunk);
                Ok(())
            }
            BodyDecoder::Gzip(decoder) => decoder.write_all(chunk),
            BodyDecoder::Deflate(decoder) => decoder.write_all(chunk),
        }
    }

    pub(crate) fn finish(self) -> io::Result<Vec<u8>> {
        match self {
            BodyDecoder::Identity(buf) => Ok(buf),
            BodyDecoder::Gzip(decoder) => decoder.finish(),
            BodyDecoder::Deflate(decoder) => decoder.finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::{GzEncoder, ZlibEncoder};

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn decode_in_chunks(encoding: Option<&str>, data: &[u8], chunk: usize) -> Vec<u8> {
        let mut decoder = BodyDecoder::for_encoding(encoding);
        for piece in data.chunks(chunk) {
            decoder.write(piece).unwrap();
        }
        decoder.finish().unwrap()
    }

    #[test]
    fn test_gzip_streamed() {
        let body = b"<html><body>compressed listing</body></html>".repeat(20);
        assert_eq!(decode_in_chunks(Some("gzip"), &gzip(&body), 7), body);
    }

    #[test]
    fn test_deflate_streamed() {
        let body = b"deflated detail page".repeat(10);
        assert_eq!(decode_in_chunks(Some("Deflate"), &zlib(&body), 3), body);
    }

    #[test]
    fn test_unknown_encoding_passes_through() {
        let body = b"br is not decoded here";
        assert_eq!(decode_in_chunks(Some("br"), body, 4), body);
        assert_eq!(decode_in_chunks(None, body, 4), body);
        assert_eq!(BodyDecoder::for_encoding(Some("br")).name(), "identity");
    }

    #[test]
    fn test_corrupt_gzip_fails() {
        let mut decoder = BodyDecoder::for_encoding(Some("gzip"));
        let result = decoder
            .write(b"definitely not gzip data")
            .and_then(|_| decoder.finish().map(|_| ()));
        assert!(result.is_err());
    }
}
