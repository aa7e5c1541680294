fn main() {
    if let Err(e) = occlusion_lens_lib::run() {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
