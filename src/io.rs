use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::codec::Utf8Transcoder;
use crate::config::IngestConfig;
use crate::{IngestError, IngestResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

#[derive(Debug, Clone)]
pub struct UploadMeta {
    /// Original file name, used for extension checks and logging.
    pub name_hint: String,
    pub compression: Compression,
    /// Which character encoding to expect (defaults to UTF-8)
    pub charset: &'static encoding_rs::Encoding,
}

impl Default for UploadMeta {
    fn default() -> Self {
        Self {
            name_hint: String::new(),
            compression: Compression::None,
            charset: encoding_rs::UTF_8,
        }
    }
}

/// Checks the upload name against the accepted extensions and works out
/// whether it is compressed. `report.CSV` passes, `report.xlsx` does not,
/// `report.csv.gz` only when compressed uploads are allowed.
pub fn classify_upload(name: &str, config: &IngestConfig) -> IngestResult<Compression> {
    let lower = name.to_ascii_lowercase();
    let (inner, compression) = if let Some(stem) = lower.strip_suffix(".gz") {
        (stem, Compression::Gzip)
    } else if let Some(stem) = lower.strip_suffix(".zst") {
        (stem, Compression::Zstd)
    } else {
        (lower.as_str(), Compression::None)
    };

    if compression != Compression::None && !config.allow_compressed {
        return Err(IngestError::UnsupportedFile(name.to_string()));
    }

    let accepted = Path::new(inner)
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| {
            config
                .accepted_extensions
                .iter()
                .any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(ext))
        });
    if !accepted {
        return Err(IngestError::UnsupportedFile(name.to_string()));
    }
    Ok(compression)
}

/// Wraps a raw upload with decompression and UTF-8 transcoding as `meta`
/// says. The result feeds straight into the decoder.
pub fn build_upload_reader<R>(raw: R, meta: &UploadMeta) -> Box<dyn AsyncRead + Unpin + Send>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = BufReader::with_capacity(1 << 16, raw);
    let decompressed: Box<dyn AsyncRead + Unpin + Send> = match meta.compression {
        Compression::Gzip => Box::new(GzipDecoder::new(buf)),
        Compression::Zstd => Box::new(ZstdDecoder::new(buf)),
        Compression::None => Box::new(buf),
    };

    if meta.charset == encoding_rs::UTF_8 {
        decompressed
    } else {
        let framed = FramedRead::new(decompressed, Utf8Transcoder::new(meta.charset));
        Box::new(StreamReader::new(framed))
    }
}

/// Opens a local upload after extension and size checks.
pub async fn open_upload(
    path: &Path,
    config: &IngestConfig,
) -> IngestResult<(Box<dyn AsyncRead + Unpin + Send>, UploadMeta)> {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    let compression = classify_upload(&name, config)?;

    let file = File::open(path).await?;
    let size = file.metadata().await?.len();
    if size > config.max_upload_bytes {
        return Err(IngestError::TooLarge {
            size,
            limit: config.max_upload_bytes,
        });
    }

    let meta = UploadMeta {
        name_hint: name,
        compression,
        charset: config.encoding()?,
    };
    debug!(
        upload = %meta.name_hint,
        size,
        charset = meta.charset.name(),
        compression = ?meta.compression,
        "upload accepted"
    );
    Ok((build_upload_reader(file, &meta), meta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_csv_is_accepted_by_default() {
        let config = IngestConfig::default();
        assert_eq!(
            classify_upload("offerings.csv", &config).unwrap(),
            Compression::None
        );
        assert!(classify_upload("OFFERINGS.CSV", &config).is_ok());
        assert!(classify_upload("offerings.xlsx", &config).is_err());
        assert!(classify_upload("offerings", &config).is_err());
        assert!(classify_upload("offerings.csv.gz", &config).is_err());
    }

    #[test]
    fn compressed_csv_when_allowed() {
        let config = IngestConfig {
            allow_compressed: true,
            ..Default::default()
        };
        assert_eq!(
            classify_upload("july.csv.gz", &config).unwrap(),
            Compression::Gzip
        );
        assert_eq!(
            classify_upload("july.csv.zst", &config).unwrap(),
            Compression::Zstd
        );
        assert!(classify_upload("july.txt.gz", &config).is_err());
    }
}
