use crate::types::{Color, Pt};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorzAlign {
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertAlign {
    Top,
    Center,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Padding {
    pub top: Pt,
    pub right: Pt,
    pub bottom: Pt,
    pub left: Pt,
}

impl Padding {
    pub fn all(value: Pt) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    pub fn horizontal(&self) -> Pt {
        self.left + self.right
    }

    pub fn vertical(&self) -> Pt {
        self.top + self.bottom
    }
}

/// Appearance and behavior shared by many cells.
///
/// Styles are interned through [`StyleCache`]; once interned they are only
/// reachable through an `Arc` and never change.
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    pub font_name: String,
    pub font_size: Pt,
    /// Zero means `font_size * 1.2`.
    pub line_height: Pt,
    pub color: Color,
    pub background: Option<Color>,
    pub h_align: HorzAlign,
    pub v_align: VertAlign,
    pub padding: Padding,
    pub border_width: Pt,
    pub word_wrap: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            font_name: "Helvetica".to_string(),
            font_size: Pt::from_f32(10.0),
            line_height: Pt::ZERO,
            color: Color::BLACK,
            background: None,
            h_align: HorzAlign::Left,
            v_align: VertAlign::Top,
            padding: Padding::all(Pt::from_f32(2.0)),
            border_width: Pt::ZERO,
            word_wrap: true,
        }
    }
}

impl Style {
    pub fn effective_line_height(&self) -> Pt {
        if self.line_height > Pt::ZERO {
            self.line_height
        } else {
            self.font_size * 1.2f32
        }
    }

    /// Average advance used for text measurement; there is no font backend here.
    pub fn char_width(&self) -> Pt {
        self.font_size * 0.5f32
    }

    /// Horizontal space eaten by padding and borders.
    pub fn horizontal_inset(&self) -> Pt {
        self.padding.horizontal() + self.border_width * 2
    }

    pub fn vertical_inset(&self) -> Pt {
        self.padding.vertical() + self.border_width * 2
    }

    /// SHA-256 over a canonical encoding of every field.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update((self.font_name.len() as u64).to_le_bytes());
        hasher.update(self.font_name.as_bytes());
        for value in [
            self.font_size,
            self.line_height,
            self.padding.top,
            self.padding.right,
            self.padding.bottom,
            self.padding.left,
            self.border_width,
        ] {
            hasher.update(value.to_milli_i64().to_le_bytes());
        }
        update_color(&mut hasher, Some(self.color));
        update_color(&mut hasher, self.background);
        hasher.update([
            self.h_align as u8,
            self.v_align as u8,
            u8::from(self.word_wrap),
        ]);
        hasher.finalize().into()
    }
}

fn update_color(hasher: &mut Sha256, color: Option<Color>) {
    match color {
        Some(color) => {
            hasher.update([1u8]);
            for channel in [color.r, color.g, color.b] {
                // Normalize -0.0 so it fingerprints like 0.0.
                let channel = if channel == 0.0 { 0.0f32 } else { channel };
                hasher.update(channel.to_bits().to_le_bytes());
            }
        }
        None => hasher.update([0u8]),
    }
}

/// Deduplicated store of styles.
///
/// Thousands of generated cells end up holding clones of O(distinct styles)
/// `Arc`s. Append-only while a table is built, read-only while it paginates.
#[derive(Debug, Clone)]
pub struct StyleCache {
    styles: Vec<Arc<Style>>,
    index: HashMap<[u8; 32], usize>,
}

impl Default for StyleCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleCache {
    pub fn new() -> Self {
        let mut cache = Self {
            styles: Vec::new(),
            index: HashMap::new(),
        };
        cache.add(Style::default());
        cache
    }

    /// Insert (or reuse) a style, returning the shared instance.
    pub fn add(&mut self, style: Style) -> Arc<Style> {
        let key = style.fingerprint();
        if let Some(&idx) = self.index.get(&key) {
            return self.styles[idx].clone();
        }
        let shared = Arc::new(style);
        self.index.insert(key, self.styles.len());
        self.styles.push(shared.clone());
        shared
    }

    /// Interns the style behind an existing `Arc`, reusing the `Arc` itself
    /// when the style is new to this cache.
    pub fn add_shared(&mut self, style: &Arc<Style>) -> Arc<Style> {
        let key = style.fingerprint();
        if let Some(&idx) = self.index.get(&key) {
            return self.styles[idx].clone();
        }
        self.index.insert(key, self.styles.len());
        self.styles.push(style.clone());
        style.clone()
    }

    /// The style every new cell starts with.
    pub fn default_style(&self) -> Arc<Style> {
        self.styles[0].clone()
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bold_red() -> Style {
        Style {
            font_size: Pt::from_f32(12.0),
            color: Color::rgb(1.0, 0.0, 0.0),
            ..Style::default()
        }
    }

    #[test]
    fn equal_styles_share_one_instance() {
        let mut cache = StyleCache::new();
        let a = cache.add(bold_red());
        let b = cache.add(bold_red());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn different_styles_get_distinct_instances() {
        let mut cache = StyleCache::new();
        let a = cache.add(bold_red());
        let b = cache.add(Style {
            background: Some(Color::WHITE),
            ..bold_red()
        });
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn default_style_is_preinterned() {
        let mut cache = StyleCache::new();
        let default = cache.default_style();
        let again = cache.add(Style::default());
        assert!(Arc::ptr_eq(&default, &again));
    }

    #[test]
    fn add_shared_adopts_foreign_arc() {
        let mut source = StyleCache::new();
        let foreign = source.add(bold_red());
        let mut target = StyleCache::new();
        let adopted = target.add_shared(&foreign);
        assert!(Arc::ptr_eq(&adopted, &foreign));
        let again = target.add(bold_red());
        assert!(Arc::ptr_eq(&again, &foreign));
    }

    #[test]
    fn line_height_defaults_from_font_size() {
        let style = Style {
            font_size: Pt::from_i32(10),
            ..Style::default()
        };
        assert_eq!(style.effective_line_height(), Pt::from_i32(12));
        let style = Style {
            line_height: Pt::from_i32(20),
            ..style
        };
        assert_eq!(style.effective_line_height(), Pt::from_i32(20));
    }
}
