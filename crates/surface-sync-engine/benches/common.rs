// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
// See: https://users.rust-lang.org/t/cargo-rustc-benches-awarnings/110111/2
#[allow(dead_code)]
pub fn generate_document_text(size: usize) -> String {
    let base = "# Title\n\nParagraph with *bold* and _italic_ text and an {img:icon.png} icon.\n\n![photo.jpg]\n\n- first item\n- second [link](https://example.com)\n\n";
    base.repeat(size)
}

#[allow(dead_code)]
pub fn build_surface(size: usize) -> surface_sync_engine::Surface {
    let data = surface_sync_engine::parse_text(&generate_document_text(size));
    let document = surface_sync_engine::ModelDocument::new(
        data,
        surface_sync_engine::TypeRegistry::standard(),
    )
    .unwrap();
    surface_sync_engine::Surface::new(document, &surface_sync_engine::SurfaceConfig::default())
        .unwrap()
}
