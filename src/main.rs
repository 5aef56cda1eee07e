fn main() {
    if let Err(err) = parksync_lib::run() {
        log::error!("parksync exited with error: {err:?}");
        eprintln!("parksync: {err:#}");
        std::process::exit(1);
    }
}
