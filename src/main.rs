fn main() {
    if let Err(err) = coviz::run() {
        eprintln!("error: {err:#}");
        let code = match err.downcast_ref::<coviz::Error>() {
            Some(inner) if inner.is_client_error() => 2,
            _ => 1,
        };
        std::process::exit(code);
    }
}
