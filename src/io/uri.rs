use anyhow::{Result, anyhow};
use std::fmt;
use std::path::PathBuf;
use url::Url;

pub const REGISTRY_SCHEME: &str = "kaggle";

/// A file inside a registry dataset: `<owner>/<dataset>/<file>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRef {
    pub owner: String,
    pub dataset: String,
    pub file: String,
}

impl DatasetRef {
    pub fn new(owner: &str, dataset: &str, file: &str) -> Self {
        Self {
            owner: owner.to_string(),
            dataset: dataset.to_string(),
            file: file.to_string(),
        }
    }

    /// `<owner>/<dataset>`, the handle used by the registry API
    pub fn handle(&self) -> String {
        format!("{}/{}", self.owner, self.dataset)
    }

    pub fn to_uri(&self) -> String {
        format!("{}://{}/{}/{}", REGISTRY_SCHEME, self.owner, self.dataset, self.file)
    }
}

impl From<(&str, &str, &str)> for DatasetRef {
    fn from((owner, dataset, file): (&str, &str, &str)) -> Self {
        Self::new(owner, dataset, file)
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.handle(), self.file)
    }
}

/// Represents a parsed source URI
#[derive(Debug, Clone)]
pub enum SourceUri {
    Local(PathBuf),
    Registry(DatasetRef),
}

impl SourceUri {
    /// Parse a URI string into a SourceUri
    pub fn parse(uri: &str) -> Result<Self> {
        // Try parsing as URL first
        if let Ok(url) = Url::parse(uri) {
            match url.scheme() {
                REGISTRY_SCHEME => {
                    let owner = url
                        .host_str()
                        .filter(|h| !h.is_empty())
                        .ok_or_else(|| anyhow!("Registry URI missing owner: {}", uri))?;

                    // Files may live in sub-folders of the dataset
                    let path = url.path().trim_start_matches('/');
                    let (dataset, file) = path
                        .split_once('/')
                        .filter(|(d, f)| !d.is_empty() && !f.is_empty())
                        .ok_or_else(|| {
                            anyhow!(
                                "Registry URI must look like {}://owner/dataset/file: {}",
                                REGISTRY_SCHEME,
                                uri
                            )
                        })?;

                    Ok(SourceUri::Registry(DatasetRef::new(owner, dataset, file)))
                }
                "file" => {
                    let path = url
                        .to_file_path()
                        .map_err(|_| anyhow!("Invalid file:// URI: {}", uri))?;
                    Ok(SourceUri::Local(path))
                }
                scheme => Err(anyhow!("Unsupported URI scheme: {}", scheme)),
            }
        } else {
            // Treat as local file path
            Ok(SourceUri::Local(PathBuf::from(uri)))
        }
    }

    /// File name part of the URI, used for format detection
    pub fn file_name(&self) -> String {
        match self {
            SourceUri::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            SourceUri::Registry(dataset) => dataset
                .file
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registry_uri() {
        let uri = SourceUri::parse(
            "kaggle://sujithmandala/dragon-ball-z-characters-information/dragon_ball_z.csv",
        )
        .unwrap();
        match uri {
            SourceUri::Registry(dataset) => {
                assert_eq!(dataset.owner, "sujithmandala");
                assert_eq!(dataset.dataset, "dragon-ball-z-characters-information");
                assert_eq!(dataset.file, "dragon_ball_z.csv");
                assert_eq!(dataset.handle(), "sujithmandala/dragon-ball-z-characters-information");
            }
            _ => panic!("Expected registry URI"),
        }
    }

    #[test]
    fn test_parse_registry_uri_nested_file() {
        let uri = SourceUri::parse("kaggle://owner/slug/data/chars.csv").unwrap();
        match &uri {
            SourceUri::Registry(dataset) => assert_eq!(dataset.file, "data/chars.csv"),
            _ => panic!("Expected registry URI"),
        }
        assert_eq!(uri.file_name(), "chars.csv");
    }

    #[test]
    fn test_registry_uri_round_trip() {
        let dataset = DatasetRef::from(crate::config::INFO_DATASET);
        let parsed = SourceUri::parse(&dataset.to_uri()).unwrap();
        assert!(matches!(parsed, SourceUri::Registry(d) if d == dataset));
    }

    #[test]
    fn test_parse_registry_uri_missing_file() {
        assert!(SourceUri::parse("kaggle://owner/slug").is_err());
        assert!(SourceUri::parse("kaggle://owner/slug/").is_err());
    }

    #[test]
    fn test_parse_local_paths() {
        assert!(matches!(
            SourceUri::parse("/data/file.csv").unwrap(),
            SourceUri::Local(_)
        ));
        assert!(matches!(
            SourceUri::parse("data/file.csv").unwrap(),
            SourceUri::Local(_)
        ));
        assert!(matches!(
            SourceUri::parse("file:///data/file.csv").unwrap(),
            SourceUri::Local(_)
        ));
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = SourceUri::parse("ftp://host/file.csv").unwrap_err();
        assert!(err.to_string().contains("Unsupported URI scheme"));
        assert!(SourceUri::parse("s3://bucket/dragon_ball_z.csv").is_err());
    }
}
