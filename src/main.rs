fn main() {
    if let Err(err) = solarshare::app::run() {
        eprintln!("application startup failed: {err}");
        std::process::exit(1);
    }
}
