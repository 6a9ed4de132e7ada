use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::warn;

use crate::elements::ElementId;

pub const STYLE_FLAT: &str = "flat";
pub const STYLE_UPDATE_JAR: &str = "updateJar";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Folder,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Plugin,
    Feature,
}

/// Declared packaging styles, keyed by element id.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StyleTable {
    pub plugins: BTreeMap<String, String>,
    pub features: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct ShapeAdvisor {
    styles: StyleTable,
    force_update_jar: bool,
}

impl ShapeAdvisor {
    pub fn new(styles: StyleTable, force_update_jar: bool) -> Self {
        Self {
            styles,
            force_update_jar,
        }
    }

    /// Archive member name and shape of an element once post-processing ran.
    /// Folder members end with `/` so archivers recurse into them.
    pub fn final_shape(&self, kind: ElementKind, element: &ElementId) -> (String, Shape) {
        let shape = self.shape_of(kind, &element.id);
        let name = match shape {
            Shape::Folder => format!("{}/", element.full_name()),
            Shape::File => element.full_name(),
        };
        (name, shape)
    }

    pub fn shape_of(&self, kind: ElementKind, id: &str) -> Shape {
        let table = match kind {
            ElementKind::Plugin => &self.styles.plugins,
            ElementKind::Feature => &self.styles.features,
        };
        let declared = table.get(id).map(|s| s.trim());
        let shape = match declared {
            Some(s) if s.eq_ignore_ascii_case(STYLE_UPDATE_JAR) => Shape::File,
            Some(s) if s.eq_ignore_ascii_case(STYLE_FLAT) || s.is_empty() => Shape::Folder,
            Some(other) => {
                warn!(element = id, style = other, "unknown packaging style, using flat");
                Shape::Folder
            }
            None => Shape::Folder,
        };
        if self.force_update_jar {
            Shape::File
        } else {
            shape
        }
    }
}
