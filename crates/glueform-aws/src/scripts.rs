use anyhow::{bail, Context, Result};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use std::path::Path;
use tracing::info;

/// Split `s3://bucket/key` into its bucket and key.
pub(crate) fn parse_s3_uri(uri: &str) -> Result<(&str, &str)> {
    let Some(rest) = uri.strip_prefix("s3://") else {
        bail!("'{}' is not an s3:// URI", uri);
    };
    match rest.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok((bucket, key)),
        _ => bail!("'{}' must name both a bucket and an object key", uri),
    }
}

/// Upload a local ETL script to the job's script location.
pub async fn upload_script(s3: &aws_sdk_s3::Client, local: &Path, script_uri: &str) -> Result<()> {
    let (bucket, key) = parse_s3_uri(script_uri)?;
    let body = std::fs::read(local)
        .with_context(|| format!("Failed to read script: {}", local.display()))?;
    let size = body.len();

    s3.put_object()
        .bucket(bucket)
        .key(key)
        .content_type("text/x-python")
        .body(ByteStream::from(body))
        .send()
        .await
        .map_err(|e| {
            anyhow::anyhow!("Failed to upload {}: {}", script_uri, DisplayErrorContext(&e))
        })?;

    info!(uri = %script_uri, bytes = size, "Uploaded ETL script");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3_uri() {
        assert_eq!(
            parse_s3_uri("s3://etl-bucket/scripts/iceberg_etl.py").unwrap(),
            ("etl-bucket", "scripts/iceberg_etl.py")
        );
        assert!(parse_s3_uri("https://etl-bucket/x.py").is_err());
        assert!(parse_s3_uri("s3://etl-bucket/").is_err());
        assert!(parse_s3_uri("s3:///key.py").is_err());
    }
}
