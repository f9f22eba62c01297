use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImageRefError {
    #[error("image reference cannot be empty")]
    Empty,
}

/// Reference to a generated image as it appears in a dataset cell.
///
/// Cells hold either an absolute URL or a path relative to the dataset's
/// content endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ImageRef {
    Url(Url),
    Path(String),
}

impl ImageRef {
    /// Parse a raw dataset cell.
    ///
    /// # Errors
    ///
    /// Returns `ImageRefError::Empty` for blank cells.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, ImageRefError> {
        let s = raw.as_ref().trim();
        if s.is_empty() {
            return Err(ImageRefError::Empty);
        }
        match Url::parse(s) {
            Ok(u) if u.has_host() => Ok(ImageRef::Url(u)),
            _ => Ok(ImageRef::Path(s.replace('\\', "/"))),
        }
    }

    /// Final path segment, e.g. `flux_kenya_food_ugali_traditional_0.png`.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        let path = match self {
            ImageRef::Url(u) => u.path(),
            ImageRef::Path(p) => p.as_str(),
        };
        path.rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// File name without its extension.
    #[must_use]
    pub fn file_stem(&self) -> Option<&str> {
        let name = self.file_name()?;
        match name.rfind('.') {
            Some(0) | None => Some(name),
            Some(idx) => Some(&name[..idx]),
        }
    }

    /// Resolve against the content endpoint; absolute URLs are returned as-is.
    #[must_use]
    pub fn resolve(&self, base: &Url) -> Option<Url> {
        match self {
            ImageRef::Url(u) => Some(u.clone()),
            ImageRef::Path(p) => base.join(p.trim_start_matches("./")).ok(),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRef::Url(u) => write!(f, "{u}"),
            ImageRef::Path(p) => f.write_str(p),
        }
    }
}

impl TryFrom<String> for ImageRef {
    type Error = ImageRefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ImageRef> for String {
    fn from(value: ImageRef) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_stay_paths() {
        let r = ImageRef::parse("images\\flux\\flux_kenya_food_ugali_general.png").unwrap();
        assert_eq!(
            r,
            ImageRef::Path("images/flux/flux_kenya_food_ugali_general.png".into())
        );
        assert_eq!(r.file_stem(), Some("flux_kenya_food_ugali_general"));
    }

    #[test]
    fn urls_keep_their_file_name() {
        let r = ImageRef::parse("https://cdn.example.org/flux/a_b_c.jpg").unwrap();
        assert!(matches!(r, ImageRef::Url(_)));
        assert_eq!(r.file_name(), Some("a_b_c.jpg"));
    }

    #[test]
    fn resolves_relative_to_base() {
        let base = Url::parse("https://cdn.example.org/dataset/").unwrap();
        let r = ImageRef::parse("./flux/x.png").unwrap();
        assert_eq!(
            r.resolve(&base).unwrap().as_str(),
            "https://cdn.example.org/dataset/flux/x.png"
        );
    }

    #[test]
    fn empty_cells_are_rejected() {
        assert_eq!(ImageRef::parse("  "), Err(ImageRefError::Empty));
    }
}
