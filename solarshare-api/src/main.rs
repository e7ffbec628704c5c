fn main() {
    if let Err(err) = solarshare::app::run_api() {
        eprintln!("api startup failed: {err}");
        std::process::exit(1);
    }
}
