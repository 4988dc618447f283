//! Lazy singletons and binding events, end to end.
//!
//! Run with `RUST_LOG=trace` to see the cell and dispatch transitions.

use std::sync::Arc;
use std::thread;

use injection::prelude::*;
use parking_lot::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

// === Events and listeners ===

struct Bound {
    name: &'static str,
}

/// Serializes bindings: holds a "lock" while the binding is being written.
struct BindingLock {
    held: Arc<Mutex<bool>>,
}

impl EventListener<Bound> for BindingLock {
    fn on_prevent(&self, event: &Bound) -> std::result::Result<Option<Guard>, BoxError> {
        let mut held = self.held.lock();
        if *held {
            return Err(format!("binding {} while another binding is in progress", event.name).into());
        }
        *held = true;

        let lock = self.held.clone();
        Ok(Some(release_with(move || *lock.lock() = false)))
    }

    fn on_event(&self, _event: &Bound) -> std::result::Result<(), BoxError> {
        Ok(())
    }
}

struct AuditLog;

impl EventListener<Bound> for AuditLog {
    fn on_event(&self, event: &Bound) -> std::result::Result<(), BoxError> {
        info!(name = event.name, "Injectable bound");
        Ok(())
    }
}

// === Lazily built configuration ===

#[derive(Debug)]
struct Config {
    database_url: String,
}

fn main() -> injection::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Arc::new(LazyCell::new(|| {
        info!("Loading configuration");
        Config {
            database_url: "postgres://localhost/app".into(),
        }
    }));

    let readers: Vec<_> = (0..4)
        .map(|i| {
            let config = config.clone();
            thread::spawn(move || {
                config
                    .force()
                    .map(|cfg| format!("reader {i}: {}", cfg.database_url))
            })
        })
        .collect();

    for reader in readers {
        match reader.join() {
            Ok(line) => println!("{}", line?),
            Err(_) => eprintln!("reader thread panicked"),
        }
    }

    let defaults = LazyMapping::new(vec![("pool_size", 16u32), ("timeout_secs", 30)]);
    println!("pool size: {:?}", defaults.get("pool_size")?);

    let lock = Arc::new(BindingLock {
        held: Arc::new(Mutex::new(false)),
    });
    let audit = Arc::new(AuditLog);

    let channel = EventChannel::new();
    channel.add_listener(&lock).add_listener(&audit);

    channel.dispatch_with(&Bound { name: "database" }, || {
        println!("binding database -> {}", config.force()?.database_url);
        Ok::<_, InjectionError>(())
    })?;

    // Dropping the audit listener removes it from the channel.
    drop(audit);
    let dispatch = channel.dispatch(&Bound { name: "cache" })?;
    println!("listeners in snapshot: {}", dispatch.listener_count());
    dispatch.complete()?;

    Ok(())
}
