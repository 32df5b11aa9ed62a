fn main() {
    if let Err(e) = deaf_driver_alert::run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
