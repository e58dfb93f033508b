use a8export::codec::CODECS;

pub fn cmd_codecs() {
    println!("Available video codecs:");
    println!("  auto   best available codec (default)");
    for codec in CODECS {
        let note = if codec.uses_interframes {
            ""
        } else {
            " (every frame a keyframe)"
        };
        println!("  {:6} {}{}", codec.id, codec.description, note);
    }
}
