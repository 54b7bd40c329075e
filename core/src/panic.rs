use crate::error;
use std::{panic, process, thread};

/// Makes any panic, on any thread, fatal to the process after logging it.
pub fn configure_panic() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let location = match panic_info.location() {
            Some(location) => format!("{}:{}:{}", location.file(), location.line(), location.column()),
            None => "<unknown>".to_owned(),
        };
        let payload = panic_info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("Box<dyn Any>");
        let current_thread = thread::current();
        error!("thread '{}' panicked at {}: {}", current_thread.name().unwrap_or("<unnamed>"), location, message);
        ::log::logger().flush();
        // the default hook prints the backtrace when enabled
        default_hook(panic_info);
        process::exit(1);
    }));
}
