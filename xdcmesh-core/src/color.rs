//! Display colours for instances.
//!
//! Colours are handed out first-come from a fixed palette so the same
//! sequence of instances always gets the same colours. Once the palette is
//! exhausted every further instance shares one fallback colour.

use std::collections::HashMap;

use crate::config::ColorConfig;

/// Maps instance ids to display colours.
pub trait ColorAllocator: Send {
    /// Returns the colour for `id`, allocating one on first sight.
    fn color_for(&mut self, id: &str) -> String;
}

/// Palette-backed allocator with a constant fallback.
#[derive(Debug, Clone)]
pub struct PaletteColors {
    palette: Vec<String>,
    fallback: String,
    assigned: HashMap<String, String>,
    next_index: usize,
}

impl PaletteColors {
    pub fn new(palette: Vec<String>, fallback: impl Into<String>) -> Self {
        Self {
            palette,
            fallback: fallback.into(),
            assigned: HashMap::new(),
            next_index: 0,
        }
    }

    pub fn from_config(config: &ColorConfig) -> Self {
        Self::new(config.palette.clone(), config.fallback.clone())
    }

    /// Number of palette colours still unassigned.
    pub fn remaining(&self) -> usize {
        self.palette.len().saturating_sub(self.next_index)
    }
}

impl Default for PaletteColors {
    fn default() -> Self {
        Self::from_config(&ColorConfig::default())
    }
}

impl ColorAllocator for PaletteColors {
    fn color_for(&mut self, id: &str) -> String {
        if let Some(color) = self.assigned.get(id) {
            return color.clone();
        }

        let Some(color) = self.palette.get(self.next_index).cloned() else {
            return self.fallback.clone();
        };
        self.next_index += 1;
        self.assigned.insert(id.to_string(), color.clone());
        color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_palette() -> PaletteColors {
        PaletteColors::new(vec!["red".to_string(), "blue".to_string()], "grey")
    }

    #[test]
    fn test_first_come_allocation_is_stable() {
        let mut colors = small_palette();

        assert_eq!(colors.color_for("3001"), "red");
        assert_eq!(colors.color_for("3002"), "blue");
        assert_eq!(colors.color_for("3001"), "red");
        assert_eq!(colors.remaining(), 0);
    }

    #[test]
    fn test_exhausted_palette_falls_back() {
        let mut colors = small_palette();
        colors.color_for("a");
        colors.color_for("b");

        assert_eq!(colors.color_for("c"), "grey");
        assert_eq!(colors.color_for("d"), "grey");
        assert_eq!(colors.color_for("a"), "red");
    }

    #[test]
    fn test_allocation_depends_on_order_only() {
        let mut left = small_palette();
        let mut right = small_palette();

        for id in ["x", "y", "z"] {
            assert_eq!(left.color_for(id), right.color_for(id));
        }
    }
}
