// Shared by several integration test binaries; each uses a different subset
#![allow(dead_code)]

use surface_sync_engine::{
    ModelDocument, Selection, Surface, SurfaceConfig, TypeRegistry, parse_text,
};

pub const FILLER: char = '~';

/// Paragraph with bold text and an inline image, a block image, then a list
pub const MIXED: &str = "ab*cd*{img:inline.png}e\n![block.png]\n- x";

pub fn config() -> SurfaceConfig {
    SurfaceConfig {
        slug_filler: FILLER,
        ..SurfaceConfig::default()
    }
}

/// A surface for the document, not yet focused
pub fn surface(text: &str) -> Surface {
    let document =
        ModelDocument::new(parse_text(text), TypeRegistry::standard()).expect("valid document");
    Surface::new(document, &config()).expect("surface")
}

pub fn focused(text: &str) -> Surface {
    let mut surface = surface(text);
    surface.focus().expect("focus");
    surface
}

pub fn select(surface: &mut Surface, selection: Selection) {
    surface
        .apply_model_change(None, Some(selection))
        .expect("select");
}

/// The tree a fresh surface renders for the surface's current model
pub fn fresh_html(surface: &Surface) -> String {
    let document = ModelDocument::new(surface.document().data().clone(), TypeRegistry::standard())
        .expect("valid document");
    Surface::new(document, &config()).expect("surface").html()
}
