use anyhow::Result;
use std::path::{Path, PathBuf};
use url::Url;

use crate::cli::NamingPolicy;

pub fn get_filename_from_url(url_str: &str) -> Result<String> {
    let url = Url::parse(url_str)?;

    if let Some(segments) = url.path_segments() {
        if let Some(filename) = segments.last() {
            if !filename.is_empty() {
                return Ok(filename.to_string());
            }
        }
    }

    // Fallback if no filename found in path
    Ok(format!("download_{}", uuid::Uuid::new_v4()))
}

pub fn sanitize_filename(filename: &str) -> String {
    filename.replace(|c: char| !c.is_alphanumeric() && c != '.' && c != '-' && c != '_', "_")
}

/// Absolute destination path for `url` inside `dir`.
pub fn output_path(dir: &Path, url: &str, policy: NamingPolicy) -> Result<PathBuf> {
    let name = sanitize_filename(&get_filename_from_url(url)?);
    let name = match policy {
        NamingPolicy::Plain => name,
        NamingPolicy::Timestamp => {
            let nanos = chrono::Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or_else(|| chrono::Utc::now().timestamp_micros() * 1000);
            format!("{}_{}", nanos, name)
        }
    };

    let dir = if dir.is_relative() {
        std::env::current_dir()?.join(dir)
    } else {
        dir.to_path_buf()
    };
    Ok(dir.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_from_last_segment() {
        let name = get_filename_from_url("https://example.com/files/a.tar.gz?x=1").unwrap();
        assert_eq!(name, "a.tar.gz");
    }

    #[test]
    fn fallback_name_when_path_is_empty() {
        let name = get_filename_from_url("https://example.com/").unwrap();
        assert!(name.starts_with("download_"));
    }

    #[test]
    fn sanitizes_odd_characters() {
        assert_eq!(sanitize_filename("my file (1).zip"), "my_file__1_.zip");
    }

    #[test]
    fn timestamp_policy_prefixes_name() {
        let path = output_path(Path::new("/tmp/out"), "http://h/x.iso", NamingPolicy::Timestamp).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        let (prefix, rest) = name.split_once('_').unwrap();
        assert!(prefix.parse::<i64>().is_ok());
        assert_eq!(rest, "x.iso");
        assert!(path.starts_with("/tmp/out"));
    }

    #[test]
    fn relative_dir_becomes_absolute() {
        let path = output_path(Path::new("downloads"), "http://h/x.iso", NamingPolicy::Plain).unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("downloads/x.iso"));
    }
}
