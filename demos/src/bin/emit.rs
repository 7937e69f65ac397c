//! Publishes a handful of nested begin/end labeled events into the shared
//! trace ring. Run `receive` first in another terminal so the shared-memory
//! segment already exists.

use std::thread::sleep;
use std::time::Duration;

use tracering_core::{Config, Emitter};

fn main() {
    env_logger::init();

    let emitter = match Emitter::init(Config::default()) {
        Ok(e) => e,
        Err(err) => {
            eprintln!("failed to open shared trace ring (is `receive` running?): {err}");
            std::process::exit(1);
        }
    };

    log::info!("emitting nested request/db spans");

    emitter.emit("request");
    sleep(Duration::from_millis(5));
    emitter.emit("db_query");
    sleep(Duration::from_millis(10));
    emitter.emit("db_query"); // matches the open db_query, closes it
    sleep(Duration::from_millis(2));
    emitter.emit("request"); // matches the open request, closes it

    log::info!("done");
}
