//! Bucket-level image slim (automatic image compression) settings.
//!
//! The store speaks XML for this endpoint:
//!
//! ```xml
//! <ImageSlim>
//!   <SlimMode>API,Auto</SlimMode>
//!   <Suffixs><Suffix>jpg</Suffix><Suffix>png</Suffix></Suffixs>
//! </ImageSlim>
//! ```

use quick_xml::{DeError, de::from_str};
use serde::{Deserialize, Serialize};

pub const SUPPORTED_SUFFIXES: [&str; 2] = ["jpg", "png"];

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageSlimSettings {
    /// Compress matching images on every read without query parameters.
    #[serde(default)]
    pub auto: bool,

    /// Compress on demand via the `imageSlim` query parameter.
    #[serde(default)]
    pub api: bool,

    /// Image formats `auto` applies to.
    #[serde(default)]
    pub suffixes: Vec<String>,
}

impl ImageSlimSettings {
    pub fn is_enabled(&self) -> bool {
        self.auto || self.api
    }

    /// Checks the settings before anything is sent to the store.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(bad) = self
            .suffixes
            .iter()
            .find(|s| !SUPPORTED_SUFFIXES.contains(&s.to_ascii_lowercase().as_str()))
        {
            return Err(format!("unsupported image format `{}` (jpg or png only)", bad));
        }
        if self.auto && self.suffixes.is_empty() {
            return Err("automatic compression needs at least one image format".into());
        }
        Ok(())
    }

    /// `SlimMode` value, e.g. `Auto,API`.
    pub fn slim_mode(&self) -> String {
        let mut modes = Vec::new();
        if self.auto {
            modes.push("Auto");
        }
        if self.api {
            modes.push("API");
        }
        modes.join(",")
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<ImageSlim>");
        xml.push_str(&format!("<SlimMode>{}</SlimMode>", self.slim_mode()));
        xml.push_str("<Suffixs>");
        for suffix in &self.suffixes {
            xml.push_str(&format!("<Suffix>{}</Suffix>", suffix.to_ascii_lowercase()));
        }
        xml.push_str("</Suffixs></ImageSlim>");
        xml
    }

    /// Parse the store's `<ImageSlim>` document.
    pub fn from_xml(xml: &str) -> Result<Self, DeError> {
        let doc: ImageSlimXml = from_str(xml)?;
        let has_mode = |name: &str| {
            doc.slim_mode
                .split(',')
                .any(|m| m.trim().eq_ignore_ascii_case(name))
        };
        Ok(Self {
            auto: has_mode("Auto"),
            api: has_mode("API"),
            suffixes: doc
                .suffixes
                .map(|list| list.suffix)
                .unwrap_or_default()
                .into_iter()
                .map(|s| s.trim().to_ascii_lowercase())
                .collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename = "ImageSlim")]
struct ImageSlimXml {
    #[serde(rename = "SlimMode", default)]
    slim_mode: String,
    #[serde(rename = "Suffixs", default)]
    suffixes: Option<SuffixList>,
}

#[derive(Debug, Deserialize)]
struct SuffixList {
    #[serde(rename = "Suffix", default)]
    suffix: Vec<String>,
}
