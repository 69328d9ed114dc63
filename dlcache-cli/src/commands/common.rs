//! Argument parsing shared across CLI commands.

use dlcache::ChecksumSet;

use crate::error::CliError;

/// Parse repeated `--checksum algo:hex` arguments into a set.
pub fn parse_checksums(specs: &[String]) -> Result<ChecksumSet, CliError> {
    let mut set = ChecksumSet::new();
    for spec in specs {
        set.insert_spec(spec).map_err(|e| {
            CliError::Usage(format!(
                "Invalid checksum '{}': {}. Expected algorithm:hexdigest, e.g. sha256:ab12...",
                spec, e
            ))
        })?;
    }
    set.check_format()?;
    Ok(set)
}

/// Parse a `Name: value` header argument.
pub fn parse_header(raw: &str) -> Result<(String, String), CliError> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| CliError::Usage(format!("Invalid header '{}': expected Name:value", raw)))?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(CliError::Usage(format!("Invalid header name in '{}'", raw)));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Human-readable byte count, e.g. `1.5 MiB`.
pub fn format_size(bytes: u64) -> String {
    indicatif::HumanBytes(bytes).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlcache::ChecksumAlgorithm;

    #[test]
    fn test_parse_checksums() {
        let set = parse_checksums(&[
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9".to_string(),
            "MD5:5eb63bbbe01eeed093cb22bb8f5acdc3".to_string(),
        ])
        .unwrap();

        assert_eq!(set.len(), 2);
        assert!(set.get(ChecksumAlgorithm::Md5).is_some());
    }

    #[test]
    fn test_parse_checksums_rejects_unknown_algorithm() {
        let err = parse_checksums(&["crc32:deadbeef".to_string()]).unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));
    }

    #[test]
    fn test_parse_checksums_rejects_short_digest() {
        assert!(parse_checksums(&["sha256:abcd".to_string()]).is_err());
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Authorization: Bearer abc:def").unwrap(),
            ("Authorization".to_string(), "Bearer abc:def".to_string())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
        assert!(parse_header("Bad Name: value").is_err());
    }
}
