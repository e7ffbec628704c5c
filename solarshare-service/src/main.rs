fn main() {
    if let Err(err) = solarshare::app::run_service() {
        eprintln!("service startup failed: {err}");
        std::process::exit(1);
    }
}
