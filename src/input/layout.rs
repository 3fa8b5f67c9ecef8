use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{BoundingBox, error::Result};

/// A region box supplied by a layout-introspection tool or by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSpec {
    #[serde(default)]
    pub label: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl RegionSpec {
    pub fn new(label: impl Into<String>, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            x,
            y,
            width,
            height,
        }
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(self.x, self.y, self.width, self.height)
    }

    /// Parses either a bare JSON array of regions or `{ "regions": [...] }`.
    pub fn parse_list(json: &str) -> Result<Vec<RegionSpec>> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RegionFile {
            List(Vec<RegionSpec>),
            Wrapped { regions: Vec<RegionSpec> },
        }

        let parsed = match serde_json::from_str::<RegionFile>(json) {
            Ok(RegionFile::List(regions)) | Ok(RegionFile::Wrapped { regions }) => regions,
            Err(_) => serde_json::from_str::<Vec<RegionSpec>>(json)?,
        };

        Ok(parsed)
    }

    pub fn load_list<P: AsRef<Path>>(path: P) -> Result<Vec<RegionSpec>> {
        let json = fs::read_to_string(path)?;
        Self::parse_list(&json)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FontSpec {
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub size_px: Option<f64>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub line_height_px: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectSpec {
    #[serde(default)]
    pub corner_radius_px: Option<f64>,
    #[serde(default)]
    pub shadow_blur_px: Option<f64>,
    #[serde(default)]
    pub opacity: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementSpec {
    #[serde(default)]
    pub bounds: Option<BoundingBox>,
    #[serde(default)]
    pub font: Option<FontSpec>,
    #[serde(default)]
    pub effects: Option<EffectSpec>,
}

/// One UI element as the design specifies it and, when available, as the
/// implementation actually rendered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutElement {
    pub label: String,
    pub expected: ElementSpec,
    #[serde(default)]
    pub measured: Option<ElementSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutMetadata {
    #[serde(default)]
    pub elements: Vec<LayoutElement>,
}

impl LayoutMetadata {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Expected element boxes, usable as comparison regions when none were
    /// supplied explicitly.
    pub fn region_specs(&self) -> Vec<RegionSpec> {
        self.elements
            .iter()
            .filter_map(|element| {
                element.expected.bounds.map(|b| RegionSpec::new(&element.label, b.x, b.y, b.width, b.height))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_region_list_both_shapes() {
        let bare = r#"[{"label":"header","x":0,"y":0,"width":400,"height":60}]"#;
        let wrapped = r#"{"regions":[{"label":"header","x":0,"y":0,"width":400,"height":60}]}"#;

        let a = RegionSpec::parse_list(bare).unwrap();
        let b = RegionSpec::parse_list(wrapped).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].bounds(), BoundingBox::new(0, 0, 400, 60));
    }

    #[test]
    fn test_parse_region_list_rejects_malformed() {
        assert!(RegionSpec::parse_list(r#"{"regions": "nope"}"#).is_err());
    }

    #[test]
    fn test_layout_region_specs_skip_unbounded_elements() {
        let json = r#"{
            "elements": [
                {"label": "title", "expected": {"bounds": {"x": 10, "y": 10, "width": 200, "height": 32},
                                                "font": {"family": "Inter", "size_px": 24.0}}},
                {"label": "caption", "expected": {"font": {"size_px": 12.0}}}
            ]
        }"#;

        let layout = LayoutMetadata::from_json(json).unwrap();
        let specs = layout.region_specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].label, "title");
        assert!(layout.elements[0].measured.is_none());
    }
}
