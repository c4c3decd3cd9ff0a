fn main() {
    if let Err(err) = shopclean::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
