fn main() {
    if let Err(e) = medrecord_lib::run() {
        eprintln!("medrecord: {e}");
        std::process::exit(1);
    }
}
