//! The `base` prop of a spec: what an image is built from
//!
//! Written as `<image_type>:<base_image>`:
//! - `libguestfs:<os>`: a virt-builder template such as `fedora-23`
//! - `layer:<spec id or path>`: a qcow2 overlay on top of another image
//! - `simple:<path or url>`: an existing image, customized in place

use std::fmt::Display;
use std::str::FromStr;

use crate::{Error, Result};

pub const IMAGE_KINDS: [&str; 3] = ["libguestfs", "layer", "simple"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseImage {
    Libguestfs(String),
    Layer(String),
    Simple(String),
}

impl BaseImage {
    pub fn kind(&self) -> &'static str {
        match self {
            BaseImage::Libguestfs(_) => "libguestfs",
            BaseImage::Layer(_) => "layer",
            BaseImage::Simple(_) => "simple",
        }
    }

    pub fn image(&self) -> &str {
        match self {
            BaseImage::Libguestfs(image) | BaseImage::Layer(image) | BaseImage::Simple(image) => {
                image
            }
        }
    }

    /// Whether the base is fetched over http(s)
    pub fn is_url(&self) -> bool {
        let image = self.image();
        image.starts_with("http://") || image.starts_with("https://")
    }
}

impl FromStr for BaseImage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let supported = IMAGE_KINDS.join(",");
        let Some((kind, image)) = s.split_once(':') else {
            return Err(Error::MalformedBase {
                base: s.to_string(),
                supported,
            });
        };
        if image.is_empty() {
            return Err(Error::MalformedBase {
                base: s.to_string(),
                supported,
            });
        }

        let image = image.to_string();
        match kind {
            "libguestfs" => Ok(BaseImage::Libguestfs(image)),
            "layer" => Ok(BaseImage::Layer(image)),
            "simple" => Ok(BaseImage::Simple(image)),
            other => Err(Error::UnknownImageKind {
                kind: other.to_string(),
                supported,
            }),
        }
    }
}

impl Display for BaseImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.image())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kinds() {
        assert_eq!(
            "libguestfs:fedora-23".parse::<BaseImage>().unwrap(),
            BaseImage::Libguestfs("fedora-23".to_string())
        );
        assert_eq!(
            "layer:el7-base".parse::<BaseImage>().unwrap(),
            BaseImage::Layer("el7-base".to_string())
        );
        let simple = "simple:http://example.com/el7.qcow2.xz"
            .parse::<BaseImage>()
            .unwrap();
        assert_eq!(simple.image(), "http://example.com/el7.qcow2.xz");
        assert!(simple.is_url());
        assert_eq!(simple.to_string(), "simple:http://example.com/el7.qcow2.xz");
    }

    #[test]
    fn test_malformed_base() {
        assert!(matches!(
            "fedora-23".parse::<BaseImage>(),
            Err(Error::MalformedBase { .. })
        ));
        assert!(matches!(
            "layer:".parse::<BaseImage>(),
            Err(Error::MalformedBase { .. })
        ));
    }

    #[test]
    fn test_unknown_kind() {
        match "docker:fedora".parse::<BaseImage>() {
            Err(Error::UnknownImageKind { kind, supported }) => {
                assert_eq!(kind, "docker");
                assert_eq!(supported, "libguestfs,layer,simple");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
